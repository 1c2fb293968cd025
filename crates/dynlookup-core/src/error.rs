#![forbid(unsafe_code)]

//! Backend query errors.

use std::fmt;

/// Error returned by a backend query.
///
/// The control never propagates this to the host; it is converted into an
/// empty candidate list plus an error notification at the fetch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The request never produced a response (connection, timeout, ...).
    Transport(String),
    /// The backend understood the request and refused it.
    Rejected(String),
    /// The backend answered with something that is not a row set.
    Malformed(String),
}

impl QueryError {
    /// Human-readable cause, without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            QueryError::Transport(msg) | QueryError::Rejected(msg) | QueryError::Malformed(msg) => {
                msg
            }
        }
    }

    /// Stable kind name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            QueryError::Transport(_) => "transport",
            QueryError::Rejected(_) => "rejected",
            QueryError::Malformed(_) => "malformed",
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Transport(msg) => write!(f, "query transport error: {msg}"),
            QueryError::Rejected(msg) => write!(f, "query rejected: {msg}"),
            QueryError::Malformed(msg) => write!(f, "malformed query response: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::Malformed(e.to_string())
    }
}
