//! Error types for NearChat
//!
//! `NearchatError` unifies every failure the router can observe. The narrower
//! `ProtocolError` and `QueueError` types describe record decoding and queue
//! collaborator failures and convert into it with `?`.

use std::net::SocketAddr;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures while decoding an inbound wire record
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed JSON record: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("Record has no action field")]
    MissingAction,
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failures reported by the queue collaborator
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Unknown delivery receipt {tag} on topic {topic}")]
    UnknownReceipt { topic: String, tag: u64 },
    #[error("Queue unavailable: {reason}")]
    Unavailable { reason: String },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Main error type for NearChat
#[derive(Debug, thiserror::Error)]
pub enum NearchatError {
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid coordinates ({lat}, {lon}): values must be finite")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Connection {connection} is closed")]
    ConnectionClosed { connection: String },

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

/// Result type for NearChat operations
pub type NearchatResult<T> = core::result::Result<T, NearchatError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_converts_into_nearchat_error() {
        let err: NearchatError = QueueError::Unavailable {
            reason: "broker down".to_string(),
        }
        .into();
        assert!(matches!(err, NearchatError::Queue(_)));
        assert_eq!(err.to_string(), "Queue error: Queue unavailable: broker down");
    }

    #[test]
    fn test_protocol_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("Malformed JSON record"));
    }
}
