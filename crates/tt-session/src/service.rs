//! Shell service: the registry and its status keeper, wired together
//!
//! Construct one per process and pass it by reference. Shutting it down
//! closes every connection, then retires all indicators and the lease.

use std::sync::Arc;

use tt_core::config::ShellConfig;
use tt_core::traits::Connector;

use crate::observer::ConnectionObserver;
use crate::registry::{Attachment, ConnectionRegistry};
use crate::status::{ResourceLease, StatusCoordinator, StatusSink};

/// The connection registry plus the status coordinator keeping watch on it
pub struct ShellService {
    registry: Arc<ConnectionRegistry>,
    status: Arc<StatusCoordinator>,
}

impl ShellService {
    /// Create a service whose connections use `connector`
    pub fn new(
        connector: Arc<dyn Connector>,
        console_capacity: usize,
        lease: Arc<dyn ResourceLease>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(connector, console_capacity));
        let status = Arc::new(StatusCoordinator::new(lease, sink));

        let keeper: Arc<dyn ConnectionObserver> = status.clone();
        registry.add_status_keeper(keeper);

        Self { registry, status }
    }

    /// Create a service using the console capacity from `config`
    pub fn from_config(
        config: &ShellConfig,
        connector: Arc<dyn Connector>,
        lease: Arc<dyn ResourceLease>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self::new(connector, config.console_capacity, lease, sink)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn status(&self) -> &Arc<StatusCoordinator> {
        &self.status
    }

    /// A surface is done with its attachment: drop its observer and dismiss
    /// any terminated indicator for the connection
    pub fn detach_surface(&self, attachment: &Attachment) {
        attachment.detach();
        self.status.surface_detached(&attachment.connection);
    }

    /// Close every connection and retire all status
    pub fn shutdown(&self) {
        self.registry.shutdown();
        self.status.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tt_core::traits::{CredentialProvider, NoCredentials, TransportSession};
    use tt_core::{Endpoint, HandshakeError};

    use crate::status::{LogStatusSink, NoopLease};

    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        async fn handshake(
            &self,
            _endpoint: &Endpoint,
            _credentials: &dyn CredentialProvider,
        ) -> Result<TransportSession, HandshakeError> {
            std::future::pending().await
        }
    }

    struct Silent;
    impl ConnectionObserver for Silent {}

    #[tokio::test]
    async fn test_status_keeper_is_attached() {
        let service = ShellService::from_config(
            &ShellConfig::default(),
            Arc::new(StalledConnector),
            Arc::new(NoopLease),
            Arc::new(LogStatusSink),
        );
        let observer: Arc<dyn ConnectionObserver> = Arc::new(Silent);

        let attachment = service
            .registry()
            .connect_or_attach(&Endpoint::new("10.0.0.5", 5555), Arc::new(NoCredentials), &observer)
            .unwrap();
        assert_eq!(attachment.connection.observer_count(), 2);

        service.detach_surface(&attachment);
        assert_eq!(attachment.connection.observer_count(), 1);

        service.shutdown();
        assert!(service.registry().is_idle());
        assert!(!service.status().lease_held());
    }
}
