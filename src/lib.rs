//! Package implement the write-side iterator for log-structured-merge
//! storage, the transform that runs when one or more runs are merged and
//! compacted into a new, denser run on disk.
//!
//! Each mutation ingested by the index carries a unique sequence-number,
//! its LSN, and concurrent readers pin snapshots of the index at specific
//! LSNs, called [read views][ReadViews]. The write iterator consumes the
//! full history of [statements][Statement] for every key, merged across
//! the input runs, and distills it down to the minimal sequence that
//! preserves what every pinned reader can observe:
//!
//! * Within one read view an arbitrary chain of inserts, replaces,
//!   upserts and deletes collapses to at most one statement.
//! * Upserts squash only into strictly older statements, never newer.
//! * Leading tombstones ahead of an insert are pruned, and a surviving
//!   insert or replace is re-typed to keep the create/update distinction
//!   truthful for the run being written.
//! * Compacting against the oldest level drops tombstones that have no
//!   older data left to mask.
//!
//! When the compacted index is a primary index, rows may be overwritten
//! before their secondary-index tombstones were generated. Statements
//! carrying the [DEFERRED_DELETE] flag record that debt and the write
//! iterator settles it through a [DeferredHandler], as a side channel of
//! surrogate DELETE statements.
//!
//! Entry point is [WriteIterator], which merges N input runs through
//! [MergeSource] and drives the whole transform.

#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

mod deferred;
mod error;
mod history;
mod rview;
mod source;
mod stmt;
mod writer;

pub use crate::deferred::{DeferredHandler, NoHandler, SinkHandler};
pub use crate::error::Error;
pub use crate::rview::ReadViews;
pub use crate::source::{MergeSource, SourceIter};
pub use crate::stmt::{Op, Statement, Upsert, DEFERRED_DELETE};
pub use crate::writer::WriteIterator;

/// Type alias for Result returned by functions of this package.
pub type Result<T> = std::result::Result<T, Error>;
