//! Connection registry
//!
//! Maps endpoints to their live [`Connection`]. Repeated or concurrent
//! connect requests for the same endpoint resolve to one connection while it
//! is alive. A connection is removed from the map once it has terminated and
//! its terminal event has been delivered; a later request for that endpoint
//! creates a fresh connection.
//!
//! Status keepers registered with [`ConnectionRegistry::add_status_keeper`]
//! are attached to every connection the registry creates, before it starts.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Notify;

use tt_core::traits::{Connector, CredentialProvider};
use tt_core::{ConnectionError, Endpoint};

use crate::connection::Connection;
use crate::observer::{ConnectionObserver, ObserverId};

/// Result of [`ConnectionRegistry::connect_or_attach`]
#[derive(Debug, Clone)]
pub struct Attachment {
    /// The shared connection for the endpoint
    pub connection: Arc<Connection>,
    /// Registration of the caller's observer on it
    pub observer_id: ObserverId,
    /// Whether this call created (and started) the connection
    pub created: bool,
}

impl Attachment {
    /// Remove the caller's observer. The connection stays open.
    pub fn detach(&self) -> bool {
        self.connection.remove_observer(self.observer_id)
    }
}

/// Process-wide map from endpoint to live connection
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    console_capacity: usize,
    connections: Arc<DashMap<Endpoint, Arc<Connection>>>,
    keepers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
    removed: Arc<Notify>,
}

impl ConnectionRegistry {
    /// Create an empty registry whose connections use `connector`
    pub fn new(connector: Arc<dyn Connector>, console_capacity: usize) -> Self {
        Self {
            connector,
            console_capacity,
            connections: Arc::new(DashMap::new()),
            keepers: RwLock::new(Vec::new()),
            removed: Arc::new(Notify::new()),
        }
    }

    /// Return the live connection for `endpoint`, creating and starting one
    /// if there is none, and attach `observer` to it.
    ///
    /// `credentials` is only consulted when a new connection is created.
    /// Must be called from within a Tokio runtime.
    pub fn connect_or_attach(
        &self,
        endpoint: &Endpoint,
        credentials: Arc<dyn CredentialProvider>,
        observer: &Arc<dyn ConnectionObserver>,
    ) -> Result<Attachment, ConnectionError> {
        loop {
            let (connection, created) = match self.connections.entry(endpoint.clone()) {
                Entry::Occupied(mut entry) => {
                    if entry.get().is_terminal() {
                        let connection = self.create(endpoint, Arc::clone(&credentials));
                        entry.insert(Arc::clone(&connection));
                        (connection, true)
                    } else {
                        (Arc::clone(entry.get()), false)
                    }
                }
                Entry::Vacant(entry) => {
                    let connection = self.create(endpoint, Arc::clone(&credentials));
                    entry.insert(Arc::clone(&connection));
                    (connection, true)
                }
            };

            // Terminated between lookup and attach: go round again and
            // replace it
            let Some(observer_id) = connection.attach_if_live(observer) else {
                tracing::debug!("{} terminated while attaching, retrying", endpoint);
                continue;
            };

            if created {
                tracing::info!("Opening new connection to {} ({})", endpoint, connection.id());
                connection.start_connect()?;
            } else {
                tracing::debug!("Attached to existing connection {} ({})", endpoint, connection.id());
            }

            return Ok(Attachment {
                connection,
                observer_id,
                created,
            });
        }
    }

    fn create(&self, endpoint: &Endpoint, credentials: Arc<dyn CredentialProvider>) -> Arc<Connection> {
        let connection = Connection::new(
            endpoint.clone(),
            Arc::clone(&self.connector),
            credentials,
            self.console_capacity,
        );

        for keeper in self.keepers.read().iter() {
            connection.add_observer(keeper);
        }

        let connections: Weak<DashMap<Endpoint, Arc<Connection>>> = Arc::downgrade(&self.connections);
        let removed = Arc::clone(&self.removed);
        connection.set_terminated_hook(Box::new(move |terminated| {
            let Some(connections) = connections.upgrade() else {
                return;
            };
            if connections
                .remove_if(terminated.endpoint(), |_, current| Arc::ptr_eq(current, terminated))
                .is_some()
            {
                tracing::debug!(
                    "Removed {} ({}) from registry",
                    terminated.endpoint(),
                    terminated.id()
                );
            }
            removed.notify_waiters();
        }));

        connection
    }

    /// Attach an observer to the live connection for `endpoint`, if any
    pub fn add_observer(
        &self,
        endpoint: &Endpoint,
        observer: &Arc<dyn ConnectionObserver>,
    ) -> Option<(Arc<Connection>, ObserverId)> {
        let connection = self.lookup(endpoint)?;
        let id = connection.attach_if_live(observer)?;
        Some((connection, id))
    }

    /// Remove an observer registration. Never closes the connection.
    pub fn remove_observer(&self, connection: &Connection, id: ObserverId) -> bool {
        connection.remove_observer(id)
    }

    /// The live connection for `endpoint`, without creating one
    pub fn lookup(&self, endpoint: &Endpoint) -> Option<Arc<Connection>> {
        self.connections
            .get(endpoint)
            .map(|r| Arc::clone(&r))
            .filter(|c| !c.is_terminal())
    }

    /// All live connections
    pub fn list(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|r| Arc::clone(&r))
            .filter(|c| !c.is_terminal())
            .collect()
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether no connection is live
    pub fn is_idle(&self) -> bool {
        self.is_empty()
    }

    /// Wait until no connection is live
    pub async fn wait_idle(&self) {
        loop {
            let removed = self.removed.notified();
            if self.is_idle() {
                return;
            }
            removed.await;
        }
    }

    /// Attach a status keeper to every current and future connection.
    ///
    /// The registry keeps the keeper alive.
    pub fn add_status_keeper(&self, keeper: Arc<dyn ConnectionObserver>) {
        self.keepers.write().push(Arc::clone(&keeper));
        for connection in self.list() {
            connection.attach_if_live(&keeper);
        }
    }

    /// Close every connection
    pub fn shutdown(&self) {
        let connections = self.list();
        tracing::info!("Shutting down registry ({} live connections)", connections.len());
        for connection in connections {
            connection.close();
        }
    }
}
