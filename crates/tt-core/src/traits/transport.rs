//! Transport collaborator traits
//!
//! The session layer never speaks a wire protocol itself. It asks a
//! [`Connector`] to perform the handshake and then drives the two halves of
//! the resulting [`TransportSession`] from separate tasks.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;

use crate::error::HandshakeError;
use crate::types::Endpoint;

/// Credentials handed to a transport during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name presented to the remote
    pub username: String,
    /// Private key used for public-key authentication
    pub private_key_path: PathBuf,
}

/// Supplies credentials for an endpoint on demand
pub trait CredentialProvider: Send + Sync {
    /// Credentials for `endpoint`, or `None` if none are available
    fn credentials(&self, endpoint: &Endpoint) -> Option<Credentials>;
}

/// Provider for transports that need no credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn credentials(&self, _endpoint: &Endpoint) -> Option<Credentials> {
        None
    }
}

/// Inbound half of a transport session
#[async_trait]
pub trait ChunkReader: Send {
    /// Next chunk of bytes. `Ok(None)` is an orderly end of stream.
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

/// Outbound half of a transport session
#[async_trait]
pub trait ChunkWriter: Send {
    /// Write all of `data`
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Release the transport. Called once, after which the writer is dropped.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// An established transport session, split into independently driven halves
pub struct TransportSession {
    /// Inbound half
    pub reader: Box<dyn ChunkReader>,
    /// Outbound half
    pub writer: Box<dyn ChunkWriter>,
}

impl TransportSession {
    /// Bundle a reader and writer
    pub fn new(reader: impl ChunkReader + 'static, writer: impl ChunkWriter + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession").finish_non_exhaustive()
    }
}

/// Performs the transport handshake for an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Negotiate a session with `endpoint`, using `credentials` if needed
    async fn handshake(
        &self,
        endpoint: &Endpoint,
        credentials: &dyn CredentialProvider,
    ) -> Result<TransportSession, HandshakeError>;
}
