//! Shell client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Which transport collaborator performs the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw TCP byte stream
    #[default]
    Tcp,
    /// SSH session channel with public-key authentication
    Ssh,
}

/// Configuration for the tether client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Port used when an endpoint is given without one
    pub default_port: u16,

    /// Handshake timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Debounce interval between console redraws
    #[serde(with = "duration_millis")]
    pub refresh_interval: Duration,

    /// Bytes of console output retained per connection
    pub console_capacity: usize,

    /// Transport used for new connections
    pub transport: TransportKind,

    /// Username for authenticated transports
    pub username: String,

    /// Private key for authenticated transports
    pub private_key_path: PathBuf,

    /// Keep the console scrolled to the newest output
    pub auto_scroll: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_port: 5555,
            connect_timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_millis(250),
            console_capacity: 64 * 1024,
            transport: TransportKind::default(),
            username: whoami::username(),
            private_key_path: super::default_config_dir().join("id_ed25519"),
            auto_scroll: true,
        }
    }
}
