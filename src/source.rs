//! Module `source` implement N-way merging of run iterators into the
//! single `(key ASC, lsn DESC)` stream consumed by the write iterator.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{stmt::Statement, Result};

/// Type alias for the lazy statement stream supplied by each input run.
/// Individual runs must yield statements in `(key ASC, lsn DESC)` order
/// and fail with [Error::SourceFail][crate::Error] on I/O error.
pub type SourceIter<'a, K, V> = Box<dyn Iterator<Item = Result<Statement<K, V>>> + 'a>;

// Heap entry keyed for min-merge, smallest key first, and within a key
// the highest lsn first. Source index breaks ties deterministically.
struct HeapItem<K, V> {
    stmt: Statement<K, V>,
    index: usize,
}

impl<K, V> PartialEq for HeapItem<K, V>
where
    K: Ord,
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K, V> Eq for HeapItem<K, V> where K: Ord {}

impl<K, V> PartialOrd for HeapItem<K, V>
where
    K: Ord,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for HeapItem<K, V>
where
    K: Ord,
{
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, reverse the key so the smallest key
        // surfaces first, keep lsn natural so the newest version of a key
        // surfaces first.
        match other.stmt.as_key().cmp(self.stmt.as_key()) {
            Ordering::Equal => match self.stmt.to_lsn().cmp(&other.stmt.to_lsn()) {
                Ordering::Equal => other.index.cmp(&self.index),
                ord => ord,
            },
            ord => ord,
        }
    }
}

/// MergeSource merge an arbitrary number of run iterators, each ordered
/// `(key ASC, lsn DESC)`, into one globally ordered stream.
///
/// The merged stream is verified on the way out: a key regression or a
/// same-key LSN that fails to descend raises `Error::Invariant` and the
/// merger poisons itself, further iteration returns None.
pub struct MergeSource<'a, K, V> {
    sources: Vec<SourceIter<'a, K, V>>,
    heap: BinaryHeap<HeapItem<K, V>>,
    last: Option<(K, u64)>,
}

impl<'a, K, V> MergeSource<'a, K, V>
where
    K: Clone + Ord,
{
    /// Create a merger over `sources` and prime the heap with the head
    /// statement of every source.
    pub fn new(mut sources: Vec<SourceIter<'a, K, V>>) -> Result<MergeSource<'a, K, V>> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            match source.next() {
                Some(Ok(stmt)) => heap.push(HeapItem { stmt, index }),
                Some(Err(err)) => return Err(err),
                None => (),
            }
        }

        Ok(MergeSource {
            sources,
            heap,
            last: None,
        })
    }

    fn poison(&mut self) {
        self.heap.clear();
        self.sources.drain(..);
    }
}

impl<'a, K, V> Iterator for MergeSource<'a, K, V>
where
    K: Clone + Ord,
{
    type Item = Result<Statement<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let HeapItem { stmt, index } = self.heap.pop()?;

        match self.sources[index].next() {
            Some(Ok(next)) => self.heap.push(HeapItem { stmt: next, index }),
            Some(Err(err)) => {
                self.poison();
                return Some(Err(err));
            }
            None => (),
        }

        if let Some((key, lsn)) = &self.last {
            let bad = match stmt.as_key().cmp(key) {
                Ordering::Less => true,
                Ordering::Equal => stmt.to_lsn() >= *lsn,
                Ordering::Greater => false,
            };
            if bad {
                self.poison();
                return Some(err_at!(Invariant, msg: "merged stream disorder at lsn {}", stmt.to_lsn()));
            }
        }
        self.last = Some((stmt.to_key(), stmt.to_lsn()));

        Some(Ok(stmt))
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
