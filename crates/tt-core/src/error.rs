//! Core error types for tether

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tether ecosystem
#[derive(Error, Debug)]
pub enum TetherError {
    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Stream error after the connection was established
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Connection usage error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while negotiating a transport session.
///
/// A connection that fails its handshake never reaches `Connected`.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The remote end refused or could not be reached
    #[error("Connection refused: {0}")]
    Refused(String),

    /// The handshake did not finish within the configured timeout
    #[error("Handshake timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The remote rejected our credentials
    #[error("Authentication rejected by remote device")]
    AuthRejected,

    /// The transport needs credentials and the provider had none
    #[error("No credentials available for {0}")]
    MissingCredentials(String),

    /// Credentials could not be loaded
    #[error("Failed to load credentials from {path}: {reason}")]
    CredentialLoad { path: PathBuf, reason: String },

    /// Protocol negotiation failed
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The handshake was abandoned because the connection was closed
    #[error("Handshake cancelled")]
    Cancelled,

    /// I/O error during the handshake
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport failure after a connection was established. Always terminal.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Reading from the transport failed
    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the transport failed
    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Programmer-usage errors local to one call on a connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// `start_connect` was called more than once
    #[error("Connection to {0} already started")]
    AlreadyStarted(String),

    /// Write attempted on a connection that is not `Connected`
    #[error("Connection to {0} is not connected")]
    NotConnected(String),
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
