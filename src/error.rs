//! Error taxonomy for trace sessions.
//!
//! Geo lookups never fail with an error: a failed lookup is reported as
//! [`crate::geo::Resolution::Unavailable`] and handled where it happens.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    /// Rejected before any transport is opened.
    #[error("target host must not be empty")]
    EmptyTarget,

    #[error("transport error: {0}")]
    Transport(String),

    /// An event arrived after the log was terminated by `end`.
    #[error("event log already ended; refusing to append {0}")]
    LogClosed(&'static str),

    #[error("malformed trace event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
