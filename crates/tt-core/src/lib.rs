//! tt-core: Core abstractions and configuration for tether
//!
//! This crate provides the shared domain types, the error taxonomy, the
//! transport collaborator traits, and configuration structures used by the
//! session layer, the transports, and the CLI.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConnectionError, HandshakeError, StreamError, TetherError};
pub use types::{ConnectionId, ConnectionState, Endpoint};
