//! Error handling for the NearChat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("NearChat error: {0}")]
    Nearchat(#[from] nearchat_core::NearchatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not resolve address {0}")]
    AddressResolution(String),

    #[error("Server closed the connection")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
