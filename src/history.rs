//! Module `history` implement per-key accumulation of statement versions
//! into read-view buckets.

use crate::{rview::ReadViews, stmt::Statement, Result};

/// KeyHistory collect every version of one key, newest first, and
/// partition them into read-view buckets. Within a bucket only the
/// statements a reader can observe are retained: everything older than
/// the bucket's first terminal statement is shadowed and dropped on
/// arrival.
///
/// The buffer is transient, it is reset and reused between keys so that
/// the per-key hot path does not allocate once bucket capacities have
/// grown to the working-set size.
pub struct KeyHistory<K, V> {
    buckets: Vec<Vec<Statement<K, V>>>,
    terminated: Vec<bool>,
    // pending deferred-delete obligation, set by the driver while
    // scanning, still unresolved when the key's history is exhausted.
    pending: Option<Statement<K, V>>,
    first_insert: bool,
}

impl<K, V> KeyHistory<K, V> {
    pub fn new(rviews: &ReadViews) -> Result<KeyHistory<K, V>> {
        let mut buckets = Vec::new();
        err_at!(OutOfMemory, buckets.try_reserve(rviews.len()))?;
        buckets.resize_with(rviews.len(), Vec::new);

        Ok(KeyHistory {
            buckets,
            terminated: vec![false; rviews.len()],
            pending: None,
            first_insert: false,
        })
    }

    /// Make the buffer ready for the next key, retaining allocations.
    pub fn reset(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
        for t in self.terminated.iter_mut() {
            *t = false;
        }
        self.pending = None;
        self.first_insert = false;
    }

    /// Accumulate one same-key statement. Statements must arrive newest
    /// first, the caller's merge source guarantees and verifies the
    /// order.
    pub fn push(&mut self, rviews: &ReadViews, stmt: Statement<K, V>) -> Result<()> {
        self.first_insert = stmt.is_insert();

        let i = rviews.bucket_of(stmt.to_lsn());
        if self.terminated[i] {
            return Ok(()); // shadowed by a newer terminal in this bucket
        }

        let bucket = &mut self.buckets[i];
        err_at!(OutOfMemory, bucket.try_reserve(1))?;
        self.terminated[i] = stmt.is_terminal();
        bucket.push(stmt);

        Ok(())
    }

    /// Return whether the oldest statement seen so far is an INSERT,
    /// meaning the key did not exist beneath this compaction's inputs.
    #[inline]
    pub fn is_first_insert(&self) -> bool {
        self.first_insert
    }

    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn bucket_mut(&mut self, i: usize) -> &mut Vec<Statement<K, V>> {
        &mut self.buckets[i]
    }

    #[inline]
    pub fn set_pending(&mut self, stmt: Option<Statement<K, V>>) {
        self.pending = stmt;
    }

    #[inline]
    pub fn take_pending(&mut self) -> Option<Statement<K, V>> {
        self.pending.take()
    }

    #[inline]
    pub fn as_pending(&self) -> Option<&Statement<K, V>> {
        self.pending.as_ref()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;
