//! Module `deferred` implement the side channel through which the write
//! iterator settles tombstones owed to secondary indexes.

use crate::{stmt::Statement, Result};

/// Capability invoked by the write iterator when a primary-index
/// overwrite is found to owe a tombstone to the secondary indexes.
///
/// `process()` is called exactly once per trigger, synchronously from the
/// iterator's `next()`, with `old` the overwritten row (never a DELETE)
/// and `new` the overwriting REPLACE or DELETE carrying the
/// [DEFERRED_DELETE][crate::DEFERRED_DELETE] flag. The surrogate DELETE
/// to persist carries the key columns of `old` at the LSN of `new`, see
/// [Statement::to_surrogate_delete]. An implementation must not re-enter
/// the write iterator; a returned error aborts the compaction.
///
/// Buffered state is released when the handler is dropped, on `close()`
/// of the owning iterator, or later if the caller took the handler back
/// after `stop()`.
pub trait DeferredHandler<K, V> {
    fn process(&mut self, old: &Statement<K, V>, new: &Statement<K, V>) -> Result<()>;
}

/// Handler that synthesizes surrogate DELETEs and buffers them in trigger
/// order, for the caller to persist into secondary indexes after the
/// compaction drains.
pub struct SinkHandler<K, V> {
    stmts: Vec<Statement<K, V>>,
}

impl<K, V> SinkHandler<K, V> {
    pub fn new() -> SinkHandler<K, V> {
        SinkHandler { stmts: Vec::new() }
    }

    /// Return the buffered surrogate DELETEs, newest trigger first.
    pub fn as_deferred(&self) -> &[Statement<K, V>] {
        &self.stmts
    }

    pub fn into_deferred(self) -> Vec<Statement<K, V>> {
        self.stmts
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl<K, V> Default for SinkHandler<K, V> {
    fn default() -> Self {
        SinkHandler::new()
    }
}

impl<K, V> DeferredHandler<K, V> for SinkHandler<K, V>
where
    K: Clone,
{
    fn process(&mut self, old: &Statement<K, V>, new: &Statement<K, V>) -> Result<()> {
        if old.is_deleted() {
            return err_at!(Invariant, msg: "deferred trigger over tombstone {}", old.to_lsn());
        }
        if !(new.is_replace() || new.is_deleted()) || !new.is_deferred_delete() {
            return err_at!(Invariant, msg: "bad deferred trigger {}", new.to_lsn());
        }

        self.stmts.push(old.to_surrogate_delete(new.to_lsn()));
        Ok(())
    }
}

/// Handler for secondary-index compactions, which never owe deferred
/// tombstones. Being called is a bug in the write iterator.
pub struct NoHandler;

impl<K, V> DeferredHandler<K, V> for NoHandler {
    fn process(&mut self, _old: &Statement<K, V>, new: &Statement<K, V>) -> Result<()> {
        err_at!(Invariant, msg: "deferred trigger on secondary index {}", new.to_lsn())
    }
}

#[cfg(test)]
#[path = "deferred_test.rs"]
mod deferred_test;
