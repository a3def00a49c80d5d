//! Module `rview` implement the ordered set of reader snapshots that
//! bracket a compaction.

use crate::Result;

/// ReadViews hold the snapshot LSNs pinned by concurrent readers while a
/// compaction runs. Together with the implicit newest sentinel, the
/// frontier of currently-writing transactions, they partition history
/// into buckets: a statement with LSN `l` belongs to the bucket of the
/// smallest read view `v` with `l <= v`. Compaction must preserve, for
/// every read view, the latest statement it can observe on every key.
///
/// Internally views are kept LSN-descending, slot 0 being the frontier,
/// so that bucket index grows with age.
#[derive(Clone, Debug)]
pub struct ReadViews {
    vlsns: Vec<u64>,
}

impl ReadViews {
    /// Create the bucket set from an ascending list of snapshot LSNs.
    /// The newest sentinel is implicit and must not be part of the list.
    pub fn new(views: Vec<u64>) -> Result<ReadViews> {
        for w in views.windows(2) {
            if w[0] >= w[1] {
                return err_at!(InvalidInput, msg: "read views not ascending {} {}", w[0], w[1]);
            }
        }
        if views.first().map_or(false, |lsn| *lsn == 0) {
            return err_at!(InvalidInput, msg: "read view lsn ZERO");
        }
        if views.last().map_or(false, |lsn| *lsn == u64::MAX) {
            return err_at!(InvalidInput, msg: "read view at frontier");
        }

        let mut vlsns = Vec::with_capacity(views.len() + 1);
        vlsns.push(u64::MAX);
        vlsns.extend(views.into_iter().rev());

        Ok(ReadViews { vlsns })
    }

    /// Return the number of buckets, read views plus the frontier.
    #[inline]
    pub fn len(&self) -> usize {
        self.vlsns.len()
    }

    /// Return the bucket that a statement with sequence number `lsn`
    /// belongs to, in O(log k). The oldest bucket runs down to the
    /// implicit ZERO sentinel, every statement lands somewhere.
    pub fn bucket_of(&self, lsn: u64) -> usize {
        // vlsns[0] is u64::MAX, so the partition point is never 0.
        self.vlsns.partition_point(|v| *v >= lsn) - 1
    }
}

#[cfg(test)]
#[path = "rview_test.rs"]
mod rview_test;
