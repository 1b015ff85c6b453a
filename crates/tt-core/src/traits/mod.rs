//! Core trait definitions

mod transport;

pub use transport::{
    ChunkReader, ChunkWriter, Connector, CredentialProvider, Credentials, NoCredentials,
    TransportSession,
};
