//! tt-transport: Transport collaborators for tether
//!
//! Concrete [`Connector`](tt_core::traits::Connector) implementations: a raw
//! TCP byte stream and an SSH session channel. Both split the negotiated
//! session into a reader and a writer half so the session layer can drive
//! them from independent tasks.

pub mod credentials;
pub mod ssh;
pub mod tcp;

pub use credentials::KeyFileCredentials;
pub use ssh::SshConnector;
pub use tcp::TcpConnector;

use std::sync::Arc;

use tt_core::config::{ShellConfig, TransportKind};
use tt_core::traits::Connector;

/// Size of the buffer used for a single transport read
pub const READ_CHUNK_SIZE: usize = 4096;

/// Build the connector selected by `config.transport`
pub fn connector_for(config: &ShellConfig) -> Arc<dyn Connector> {
    match config.transport {
        TransportKind::Tcp => Arc::new(TcpConnector::new(config.connect_timeout)),
        TransportKind::Ssh => Arc::new(SshConnector::new(config.connect_timeout)),
    }
}
