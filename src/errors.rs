//! Error types for the work broker

use thiserror::Error;

/// Errors surfaced by the broker.
///
/// Benign races (an id that is no longer live, an id held by another
/// session, a mark from a session that is not the marker) are not errors;
/// those operations are silently skipped.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Session has ended")]
    SessionEnded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("Failed to encode event: {0}")]
    Encode(String),

    #[error("Session task failed: {0}")]
    TaskFailed(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
