//! Core error types for tether

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport client
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error on the local channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The service did not complete the subscribe handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The service refused the subscription
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    /// A message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The channel was closed by the other side
    #[error("Connection closed")]
    Closed,

    /// An operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
