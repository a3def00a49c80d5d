use std::{error, fmt};

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix string, identifying the file:line where
/// the error originated, and a message. Use the `err_at!` macro to
/// construct them.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// An input stream failed, typically disk I/O or decode failure while
    /// iterating a run. Fatal, the compaction must be abandoned.
    SourceFail(String, String),
    /// The deferred-delete handler refused or failed to process a
    /// surrogate tombstone. Fatal, the compaction must be abandoned.
    HandlerFail(String, String),
    /// Could not allocate memory while accumulating a key's history.
    OutOfMemory(String, String),
    /// Inputs are not in the expected order, or the API was driven out of
    /// its documented state sequence. Indicates a bug in an upstream
    /// component and is fatal.
    Invariant(String, String),
    /// Invalid construction parameters, like an unsorted read-view list.
    InvalidInput(String, String),
    /// Failed to serialize or deserialize a statement as cbor.
    FailCbor(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            SourceFail(p, m) => write!(f, "SourceFail:{} {}", p, m),
            HandlerFail(p, m) => write!(f, "HandlerFail:{} {}", p, m),
            OutOfMemory(p, m) => write!(f, "OutOfMemory:{} {}", p, m),
            Invariant(p, m) => write!(f, "Invariant:{} {}", p, m),
            InvalidInput(p, m) => write!(f, "InvalidInput:{} {}", p, m),
            FailCbor(p, m) => write!(f, "FailCbor:{} {}", p, m),
        }
    }
}

impl error::Error for Error {}
