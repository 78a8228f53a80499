//! Error types for platform-events
//!
//! This module defines the error taxonomy shared by every stage of the
//! consumer: credential exchange, topic negotiation, schema decoding, the
//! checkpoint protocol, and cursor persistence. It uses `thiserror` so the
//! variants stay matchable by callers that own reconnect policy.

use thiserror::Error;

/// Main error type for platform-events operations
///
/// Variants are grouped by how a caller should react to them. Use
/// [`Error::is_fatal`] to decide whether the session must be torn down and
/// rebuilt (Login → Resolve → new Subscription).
#[derive(Error, Debug)]
pub enum Error {
    /// Credential or identity exchange failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The authenticated identity may not subscribe to the topic
    #[error("Permission error: {0}")]
    Permission(String),

    /// Topic lookup failed or the topic does not exist
    #[error("Topic error: {0}")]
    Topic(String),

    /// Checkpoint protocol misuse (e.g. reading while a batch is unconfirmed)
    #[error("State error: {0}")]
    State(String),

    /// A payload could not be decoded against its resolved schema
    #[error("Decode error: {0}")]
    Decode(String),

    /// Replay cursor persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// RPC or stream level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded call did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` when the session is unusable and the caller must
    /// reconnect from scratch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::Permission(_) | Self::Topic(_) | Self::Transport(_)
        )
    }

    /// Returns `true` when the same call can be retried on the current
    /// session without reconnecting.
    pub fn is_retryable_in_place(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Storage(_) | Self::Timeout(_))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Self::Transport(format!("{:?}: {}", status.code(), status.message()))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<apache_avro::Error> for Error {
    fn from(err: apache_avro::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type alias for platform-events library operations
pub type Result<T> = std::result::Result<T, Error>;
