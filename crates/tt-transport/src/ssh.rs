//! SSH transport
//!
//! Opens a session channel with a shell on the remote device. Channel data
//! arrives through the russh client handler and is forwarded to the reader
//! half over an mpsc channel; the writer half owns the channel itself.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelId, Disconnect};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;

use tt_core::traits::{ChunkReader, ChunkWriter, Connector, CredentialProvider, TransportSession};
use tt_core::{Endpoint, HandshakeError};

/// Capacity of the handler-to-reader channel.
///
/// Bounded so a slow consumer pushes back on the SSH session instead of
/// buffering without limit.
const CHANNEL_EVENT_CAPACITY: usize = 256;

/// Connects to an endpoint over SSH with public-key authentication
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    /// Create a connector with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn handshake(
        &self,
        endpoint: &Endpoint,
        credentials: &dyn CredentialProvider,
    ) -> Result<TransportSession, HandshakeError> {
        let creds = credentials
            .credentials(endpoint)
            .ok_or_else(|| HandshakeError::MissingCredentials(endpoint.to_string()))?;

        let key = russh_keys::load_secret_key(&creds.private_key_path, None).map_err(|e| {
            HandshakeError::CredentialLoad {
                path: creds.private_key_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_EVENT_CAPACITY);
        let handler = ClientHandler { event_tx };

        tracing::debug!("Connecting to {} over SSH", endpoint);
        let mut session = tokio::time::timeout(
            self.connect_timeout,
            client::connect(
                Arc::new(Config::default()),
                (endpoint.host(), endpoint.port()),
                handler,
            ),
        )
        .await
        .map_err(|_| HandshakeError::Timeout(self.connect_timeout))?
        .map_err(|e| HandshakeError::Refused(format!("Failed to connect to {}: {}", endpoint, e)))?;

        tracing::debug!("Authenticating to {} as '{}'", endpoint, creds.username);
        let authenticated = session
            .authenticate_publickey(&creds.username, Arc::new(key))
            .await
            .map_err(|e| HandshakeError::Negotiation(format!("Authentication error: {}", e)))?;

        if !authenticated {
            return Err(HandshakeError::AuthRejected);
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| HandshakeError::Negotiation(format!("Failed to open channel: {}", e)))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| HandshakeError::Negotiation(format!("Shell request failed: {}", e)))?;

        tracing::debug!("Shell channel open on {}", endpoint);

        Ok(TransportSession::new(
            SshChunkReader {
                event_rx,
                finished: false,
            },
            SshChunkWriter { session, channel },
        ))
    }
}

/// What the client handler forwards to the reader half
#[derive(Debug)]
enum ChannelEvent {
    Data(Bytes),
    Eof,
}

struct SshChunkReader {
    event_rx: mpsc::Receiver<ChannelEvent>,
    finished: bool,
}

#[async_trait]
impl ChunkReader for SshChunkReader {
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        match self.event_rx.recv().await {
            Some(ChannelEvent::Data(data)) => Ok(Some(data)),
            Some(ChannelEvent::Eof) => {
                self.finished = true;
                Ok(None)
            }
            // Handler dropped without an EOF: the session went away underneath us
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "SSH session terminated",
            )),
        }
    }
}

struct SshChunkWriter {
    session: Handle<ClientHandler>,
    channel: Channel<Msg>,
}

#[async_trait]
impl ChunkWriter for SshChunkWriter {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        if let Err(e) = self.channel.eof().await {
            tracing::debug!("Failed to send channel EOF: {}", e);
        }
        self.session
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

/// russh client handler that forwards channel traffic to the reader half
struct ClientHandler {
    event_tx: mpsc::Sender<ChannelEvent>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Host key pinning is left to the network layer; the key is logged only.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Server host key: {}", server_public_key.fingerprint());
        Ok(true)
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        let _ = self
            .event_tx
            .send(ChannelEvent::Data(Bytes::copy_from_slice(data)))
            .await;
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel EOF");
        let _ = self.event_tx.send(ChannelEvent::Eof).await;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed");
        let _ = self.event_tx.send(ChannelEvent::Eof).await;
        Ok(())
    }
}
