//! Crate-wide error type.

use std::fmt;
use std::io;

/// Unified error type returned by fallible replica and transport operations.
///
/// Mirrors the teacher's `SummersetError`: a small enum with an escape-hatch
/// `Msg` variant for protocol-logic errors, plus `From` conversions for the
/// handful of library errors the transport layer actually produces.
#[derive(Debug)]
pub enum RaftKvError {
    /// A free-form protocol or configuration error, usually built through
    /// [`logged_err`](crate::logged_err).
    Msg(String),
    /// Transport I/O failure (socket bind/send/recv).
    Io(io::Error),
    /// Wire (de)serialization failure.
    Serde(serde_json::Error),
}

impl RaftKvError {
    /// Builds a `Msg` variant from anything `Display`-able.
    pub fn msg<S: fmt::Display>(s: S) -> Self {
        RaftKvError::Msg(s.to_string())
    }
}

impl fmt::Display for RaftKvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaftKvError::Msg(s) => write!(f, "{}", s),
            RaftKvError::Io(e) => write!(f, "io error: {}", e),
            RaftKvError::Serde(e) => write!(f, "serde error: {}", e),
        }
    }
}

impl std::error::Error for RaftKvError {}

impl From<io::Error> for RaftKvError {
    fn from(e: io::Error) -> Self {
        RaftKvError::Io(e)
    }
}

impl From<serde_json::Error> for RaftKvError {
    fn from(e: serde_json::Error) -> Self {
        RaftKvError::Serde(e)
    }
}

/// Crate-wide result alias.
pub type RaftKvResult<T> = Result<T, RaftKvError>;
