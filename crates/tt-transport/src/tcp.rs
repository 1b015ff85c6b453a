//! Raw TCP transport
//!
//! The handshake is just the TCP connect; the session is the byte stream.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use tt_core::traits::{ChunkReader, ChunkWriter, Connector, CredentialProvider, TransportSession};
use tt_core::{Endpoint, HandshakeError};

use crate::READ_CHUNK_SIZE;

/// Connects to an endpoint over plain TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn handshake(
        &self,
        endpoint: &Endpoint,
        _credentials: &dyn CredentialProvider,
    ) -> Result<TransportSession, HandshakeError> {
        tracing::debug!("Connecting to {} over TCP", endpoint);

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        .map_err(|_| HandshakeError::Timeout(self.connect_timeout))?
        .map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused => {
                HandshakeError::Refused(format!("{} refused the connection", endpoint))
            }
            _ => HandshakeError::Io(e),
        })?;

        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(TransportSession::new(
            TcpChunkReader::new(read_half),
            TcpChunkWriter { half: write_half },
        ))
    }
}

struct TcpChunkReader {
    half: OwnedReadHalf,
    buffer: BytesMut,
}

impl TcpChunkReader {
    fn new(half: OwnedReadHalf) -> Self {
        Self {
            half,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }
}

#[async_trait]
impl ChunkReader for TcpChunkReader {
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.buffer.reserve(READ_CHUNK_SIZE);
        let n = self.half.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buffer.split().freeze()))
    }
}

struct TcpChunkWriter {
    half: OwnedWriteHalf,
}

#[async_trait]
impl ChunkWriter for TcpChunkWriter {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.half.write_all(data).await?;
        self.half.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.half.shutdown().await
    }
}
