//! Module `writer` implement the write iterator, the merging/compaction
//! transform of the storage engine.
//!
//! The iterator consumes statements from N input runs in `(key ASC, lsn
//! DESC)` order, accumulates the full history of one key at a time,
//! partitions it into [read-view buckets][crate::ReadViews] and reduces
//! every bucket to at most one output statement. The output stream is the
//! minimal sequence that preserves, for every pinned read view and for
//! the frontier of new transactions, the latest statement visible on
//! every key.
//!
//! Reduction walks buckets oldest to newest so that a bucket left with a
//! bare upsert chain can land on the output already produced beneath it.
//! Three groups of rewrites run on the reduced sequence:
//!
//! * tombstone hygiene, a DELETE shadowed by an adjacent older DELETE is
//!   tautological, and a DELETE left at the oldest position has nothing
//!   to mask when compacting against the oldest level, or when the key's
//!   oldest input is an INSERT;
//! * create/update discipline, the oldest surviving statement is re-typed
//!   so that INSERT still means "no older row exist" for the run being
//!   written;
//! * deferred-tombstone debts, settled through the handler while the
//!   history is scanned, with an unresolved obligation re-emitted so a
//!   future compaction sees it.

use log::{debug, info};

use std::{mem, vec};

use crate::{
    deferred::DeferredHandler,
    history::KeyHistory,
    rview::ReadViews,
    source::{MergeSource, SourceIter},
    stmt::{Statement, Upsert},
    Result,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Created,
    Started,
    Drained,
    Stopped,
}

/// WriteIterator merge and compact the statement history of one or more
/// input runs into the stream to be persisted as a new, denser run.
///
/// Drive it as,
///
/// ```ignore
/// let mut wi = WriteIterator::new(rviews, true, false, Some(handler))?;
/// wi.add_source(run1)?;
/// wi.add_source(run2)?;
/// wi.start()?;
/// for stmt in wi.by_ref() {
///     writer.persist(stmt?)?;
/// }
/// wi.stop();
/// let deferred = wi.take_handler();
/// ```
///
/// All errors surface from the iteration; they are fatal and the caller
/// must discard partial output, the input runs remain authoritative. A
/// key is fully reduced before any of its outputs surface, the stream
/// never breaks inside a key.
pub struct WriteIterator<'a, K, V, H> {
    is_primary: bool,
    is_last_level: bool,
    rviews: ReadViews,
    handler: Option<H>,

    sources: Vec<SourceIter<'a, K, V>>,
    merge: Option<MergeSource<'a, K, V>>,
    lookahead: Option<Statement<K, V>>,
    history: KeyHistory<K, V>,
    cur: vec::IntoIter<Statement<K, V>>,
    state: State,

    n_keys: u64,
    n_input: u64,
    n_output: u64,
    n_deferred: u64,
}

impl<'a, K, V, H> WriteIterator<'a, K, V, H>
where
    K: Clone + Ord,
    V: Clone + PartialEq + Upsert,
    H: DeferredHandler<K, V>,
{
    /// Create a write iterator for a compaction bracketed by `rviews`.
    ///
    /// `is_primary` compactions settle deferred-tombstone debts through
    /// `handler`, which is mandatory for them and rejected otherwise.
    /// `is_last_level` must be set when compacting against the oldest
    /// on-disk level, it licenses dropping tombstones that have no older
    /// data left to mask.
    pub fn new(
        rviews: ReadViews,
        is_primary: bool,
        is_last_level: bool,
        handler: Option<H>,
    ) -> Result<WriteIterator<'a, K, V, H>> {
        match (is_primary, &handler) {
            (true, None) => {
                return err_at!(InvalidInput, msg: "primary compaction without deferred handler")
            }
            (false, Some(_)) => {
                return err_at!(InvalidInput, msg: "deferred handler on secondary index")
            }
            _ => (),
        }

        let history = KeyHistory::new(&rviews)?;

        Ok(WriteIterator {
            is_primary,
            is_last_level,
            rviews,
            handler,

            sources: Vec::new(),
            merge: None,
            lookahead: None,
            history,
            cur: Vec::new().into_iter(),
            state: State::Created,

            n_keys: 0,
            n_input: 0,
            n_output: 0,
            n_deferred: 0,
        })
    }

    /// Add one input run. Valid only before `start()`.
    pub fn add_source(&mut self, source: SourceIter<'a, K, V>) -> Result<&mut Self> {
        if self.state != State::Created {
            return err_at!(Invariant, msg: "add_source in {:?}", self.state);
        }
        self.sources.push(source);
        Ok(self)
    }

    /// Prime the merge heap and begin iteration.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Created {
            return err_at!(Invariant, msg: "start in {:?}", self.state);
        }

        debug!(
            target: "distil",
            "start sources:{} read-views:{} primary:{} last-level:{}",
            self.sources.len(), self.rviews.len() - 1, self.is_primary, self.is_last_level
        );

        let sources = mem::take(&mut self.sources);
        self.merge = Some(MergeSource::new(sources)?);
        self.state = State::Started;

        Ok(())
    }

    /// Release iteration state. The handler and its buffered tombstones
    /// survive for inspection until `close()`, or until taken back with
    /// [WriteIterator::take_handler].
    pub fn stop(&mut self) {
        self.release();
        self.state = State::Stopped;
        info!(
            target: "distil",
            "stop keys:{} in:{} out:{} deferred:{}",
            self.n_keys, self.n_input, self.n_output, self.n_deferred
        );
    }

    /// Release everything, including the handler.
    pub fn close(mut self) {
        self.release();
        self.handler = None;
        debug!(
            target: "distil",
            "close keys:{} in:{} out:{} deferred:{}",
            self.n_keys, self.n_input, self.n_output, self.n_deferred
        );
    }

    /// Inspect the deferred-delete handler.
    pub fn as_handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    /// Take back ownership of the deferred-delete handler.
    pub fn take_handler(&mut self) -> Option<H> {
        self.handler.take()
    }

    fn release(&mut self) {
        self.merge = None;
        self.lookahead = None;
        self.sources.drain(..);
        self.history.reset();
        self.cur = Vec::new().into_iter();
    }

    fn pull(&mut self) -> Result<Option<Statement<K, V>>> {
        match self.lookahead.take() {
            Some(stmt) => Ok(Some(stmt)),
            None => match self.merge.as_mut() {
                Some(merge) => match merge.next() {
                    Some(Ok(stmt)) => Ok(Some(stmt)),
                    Some(Err(err)) => Err(err),
                    None => Ok(None),
                },
                None => Ok(None),
            },
        }
    }

    // Accumulate the next key's full history and reduce it. Returns None
    // when the merged stream is exhausted.
    fn build_key(&mut self) -> Result<Option<Vec<Statement<K, V>>>> {
        let first = match self.pull()? {
            Some(stmt) => stmt,
            None => return Ok(None),
        };
        let key = first.to_key();

        self.history.reset();
        self.n_keys += 1;

        let mut pending: Option<Statement<K, V>> = None;
        let mut stmt = first;
        loop {
            self.n_input += 1;

            if self.is_primary {
                // `stmt` is the row the previously seen flagged statement
                // overwrote. A tombstone beneath the overwrite owes
                // nothing to the secondary indexes.
                if let Some(new) = pending.take() {
                    if !stmt.is_deleted() {
                        match self.handler.as_mut() {
                            Some(handler) => handler.process(&stmt, &new)?,
                            None => return err_at!(Invariant, msg: "deferred handler gone"),
                        }
                        self.n_deferred += 1;
                    }
                }
                if stmt.is_deferred_delete() && (stmt.is_replace() || stmt.is_deleted()) {
                    pending = Some(stmt.clone());
                }
            }

            self.history.push(&self.rviews, stmt)?;

            match self.pull()? {
                Some(next) if next.as_key() == &key => stmt = next,
                Some(next) => {
                    self.lookahead = Some(next);
                    break;
                }
                None => break,
            }
        }
        self.history.set_pending(pending);

        let outs = self.reduce_key()?;
        Ok(Some(outs))
    }

    // Reduce the accumulated history to the minimal read-view preserving
    // sequence, returned newest first.
    fn reduce_key(&mut self) -> Result<Vec<Statement<K, V>>> {
        let first_insert = self.history.is_first_insert();

        let mut outs: Vec<Statement<K, V>> = Vec::new(); // oldest first
        for i in (0..self.history.num_buckets()).rev() {
            if self.history.bucket_mut(i).is_empty() {
                continue;
            }
            let out = {
                let hint = outs.last();
                reduce_bucket(self.history.bucket_mut(i), hint, self.is_last_level)?
            };
            let skip = match outs.last() {
                // a DELETE shadowed by an adjacent older DELETE masks nothing
                Some(older) if out.is_deleted() && older.is_deleted() => true,
                // a terminal repeating the observable state beneath it adds
                // nothing, readers fall through to the older statement
                Some(older) => {
                    out.is_terminal()
                        && !out.is_deleted()
                        && out.as_op() == older.as_op()
                        && !out.is_deferred_delete()
                        && !older.is_deferred_delete()
                }
                None => false,
            };
            if !skip {
                outs.push(out);
            }
        }

        // A DELETE left at the oldest position has nothing to mask when
        // this is the oldest level, or when the key's oldest input is an
        // INSERT and hence no older run holds the key.
        if let Some(first) = outs.first() {
            if first.is_deleted() && (first_insert || self.is_last_level) {
                outs.remove(0);
            }
        }

        // Keep the create/update distinction truthful for the run being
        // written.
        if let Some(first) = outs.first_mut() {
            if first.is_insert() && !first_insert {
                *first = first.to_replace()?;
            } else if first.is_replace() && first_insert {
                *first = first.to_insert()?;
            }
        }

        // Re-emit an unresolved deferred obligation so that a future
        // compaction still sees the debt, unless a read view already put
        // the statement in the output. Beneath the oldest level there is
        // nothing the obligation could refer to.
        let unresolved = match self.history.as_pending() {
            Some(p) if self.is_primary && !self.is_last_level => {
                if !outs.iter().any(|s| s.to_lsn() == p.to_lsn()) {
                    outs.insert(0, p.clone());
                }
                Some(p.to_lsn())
            }
            _ => None,
        };

        // obligations settled by this compaction don't travel further
        for stmt in outs.iter_mut() {
            if Some(stmt.to_lsn()) != unresolved {
                stmt.clear_deferred_delete();
            }
        }

        outs.reverse();
        Ok(outs)
    }
}

impl<'a, K, V, H> Iterator for WriteIterator<'a, K, V, H>
where
    K: Clone + Ord,
    V: Clone + PartialEq + Upsert,
    H: DeferredHandler<K, V>,
{
    type Item = Result<Statement<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            State::Created => return Some(err_at!(Invariant, msg: "next() before start()")),
            State::Drained | State::Stopped => return None,
            State::Started => (),
        }

        loop {
            if let Some(stmt) = self.cur.next() {
                self.n_output += 1;
                return Some(Ok(stmt));
            }
            match self.build_key() {
                Ok(Some(outs)) => self.cur = outs.into_iter(),
                Ok(None) => {
                    self.state = State::Drained;
                    debug!(
                        target: "distil",
                        "drained keys:{} in:{} out:{}",
                        self.n_keys, self.n_input, self.n_output
                    );
                    return None;
                }
                Err(err) => {
                    self.release();
                    self.state = State::Stopped;
                    return Some(Err(err));
                }
            }
        }
    }
}

// Reduce one bucket to the single statement its read view observes.
// `hint` is the output already produced for the next older read view,
// a bare upsert chain lands on it when it is terminal.
fn reduce_bucket<K, V>(
    bucket: &mut Vec<Statement<K, V>>,
    hint: Option<&Statement<K, V>>,
    is_last_level: bool,
) -> Result<Statement<K, V>>
where
    K: Clone + Ord,
    V: Clone + Upsert,
{
    let mut iter = bucket.drain(..);
    let mut acc = match iter.next() {
        Some(stmt) => stmt,
        None => return err_at!(Invariant, msg: "reduce on empty bucket"),
    };
    if acc.is_terminal() {
        return Ok(acc); // shadows the rest of its bucket
    }

    // upsert chain, newest first, with at most one terminal at the tail
    for older in iter {
        if older.is_terminal() {
            return acc.merge_upsert(Some(&older));
        }
        acc = acc.merge_upsert(Some(&older))?;
    }

    match hint {
        Some(h) if h.is_terminal() => acc.merge_upsert(Some(h)),
        Some(_) => Ok(acc),
        // compacting against the oldest level, there is no older value
        // the chain could land on
        None if is_last_level => acc.merge_upsert(None),
        None => Ok(acc),
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
