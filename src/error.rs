//! Crate-wide error type.
//!
//! Mirrors the teacher's preference for a plain, manually implemented enum
//! over a derive-macro error crate.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the traversal engine.
#[derive(Debug)]
pub enum Error {
    /// A filesystem or resource-exhaustion error for a specific path.
    Io(io::Error),
    /// A logic error: invalid configuration, caught before any callback runs.
    Invalid(&'static str),
    /// The visitor callback requested early termination.
    Stopped,
}

impl Error {
    /// Borrow the underlying `io::Error`, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }

    /// The OS error code, if this wraps one.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{err}"),
            Error::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
            Error::Stopped => write!(f, "traversal stopped by callback"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Construct an `Error::Io` from a raw errno value.
pub fn from_errno(errno: i32) -> Error {
    Error::Io(io::Error::from_raw_os_error(errno))
}
