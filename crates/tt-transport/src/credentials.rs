//! Key-file credential provider

use std::path::PathBuf;

use tt_core::config::ShellConfig;
use tt_core::traits::{CredentialProvider, Credentials};
use tt_core::Endpoint;

/// Hands out one username/key-file pair for every endpoint.
///
/// The key must already exist; generating it is not this crate's job.
#[derive(Debug, Clone)]
pub struct KeyFileCredentials {
    username: String,
    private_key_path: PathBuf,
}

impl KeyFileCredentials {
    /// Create a provider for a fixed username and key path
    pub fn new(username: impl Into<String>, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            private_key_path: private_key_path.into(),
        }
    }

    /// Create a provider from the shell configuration
    pub fn from_config(config: &ShellConfig) -> Self {
        Self::new(config.username.clone(), config.private_key_path.clone())
    }
}

impl CredentialProvider for KeyFileCredentials {
    fn credentials(&self, endpoint: &Endpoint) -> Option<Credentials> {
        if !self.private_key_path.exists() {
            tracing::debug!(
                "No key at {:?} for {}",
                self.private_key_path,
                endpoint
            );
            return None;
        }

        Some(Credentials {
            username: self.username.clone(),
            private_key_path: self.private_key_path.clone(),
        })
    }
}
