//! Connection observers and fan-out
//!
//! Observers are held weakly: a connection never keeps an observer alive.
//! Each registration has a delivery gate so that [`ObserverSet::remove`]
//! can wait out a callback that is already running on another thread. Once
//! `remove` returns, that registration receives nothing more.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};

use tt_core::{HandshakeError, StreamError};

use crate::connection::Connection;

/// Lifecycle event emitted by a connection
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Handshake finished, the connection is `Connected`
    Established,
    /// Handshake failed, the connection is `Failed` and was never `Connected`
    ConnectFailed(Arc<HandshakeError>),
    /// Transport failed after `Connected`, the connection is `Failed`
    StreamFailed(Arc<StreamError>),
    /// Orderly close from either side
    Closed,
}

impl LifecycleEvent {
    /// Whether this event ends the connection
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleEvent::Established)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Established => "established",
            LifecycleEvent::ConnectFailed(_) => "connect-failed",
            LifecycleEvent::StreamFailed(_) => "stream-failed",
            LifecycleEvent::Closed => "closed",
        }
    }
}

/// Something that wants to hear about a connection.
///
/// Interactive surfaces usually override [`on_lifecycle`](Self::on_lifecycle),
/// [`on_data`](Self::on_data) and [`wants_data`](Self::wants_data). Status
/// keepers override the per-event hooks and leave data alone.
///
/// Callbacks run on the connection's task while its delivery lock is held:
/// keep them short and never block on another connection from inside one.
pub trait ConnectionObserver: Send + Sync {
    /// Called once per lifecycle transition, in transition order
    fn on_lifecycle(&self, connection: &Arc<Connection>, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Established => self.on_established(connection),
            LifecycleEvent::ConnectFailed(error) => self.on_connect_failed(connection, error),
            LifecycleEvent::StreamFailed(error) => self.on_failed(connection, error),
            LifecycleEvent::Closed => self.on_closed(connection),
        }
    }

    /// The connection reached `Connected`
    fn on_established(&self, _connection: &Arc<Connection>) {}

    /// The handshake failed
    fn on_connect_failed(&self, _connection: &Arc<Connection>, _error: &HandshakeError) {}

    /// The transport failed after the connection was established
    fn on_failed(&self, _connection: &Arc<Connection>, _error: &StreamError) {}

    /// The connection closed
    fn on_closed(&self, _connection: &Arc<Connection>) {}

    /// A chunk of output arrived. Only called if [`wants_data`](Self::wants_data).
    fn on_data(&self, _connection: &Arc<Connection>, _data: &Bytes) {}

    /// Whether this observer receives data events at all
    fn wants_data(&self) -> bool {
        false
    }
}

/// Handle for one observer registration on one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

impl ObserverId {
    fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct DeliveryGate {
    removed: AtomicBool,
    delivery: ReentrantMutex<()>,
}

struct Registration {
    id: ObserverId,
    observer: Weak<dyn ConnectionObserver>,
    wants_data: bool,
    gate: Arc<DeliveryGate>,
}

/// A registration resolved for one fan-out pass
pub(crate) struct LiveObserver {
    id: ObserverId,
    observer: Arc<dyn ConnectionObserver>,
    wants_data: bool,
    gate: Arc<DeliveryGate>,
}

impl LiveObserver {
    pub(crate) fn wants_data(&self) -> bool {
        self.wants_data
    }

    /// Run `f` against the observer unless it was removed meanwhile.
    ///
    /// A panicking observer is logged and skipped; it does not take the
    /// caller down with it.
    pub(crate) fn deliver(&self, context: &str, f: impl FnOnce(&dyn ConnectionObserver)) {
        let _guard = self.gate.delivery.lock();
        if self.gate.removed.load(Ordering::Acquire) {
            return;
        }

        let observer = self.observer.as_ref();
        if catch_unwind(AssertUnwindSafe(|| f(observer))).is_err() {
            tracing::error!(
                "Observer {:?} panicked while handling {}; continuing fan-out",
                self.id,
                context
            );
        }
    }
}

/// The observers registered on one connection
#[derive(Default)]
pub(crate) struct ObserverSet {
    registrations: Mutex<Vec<Registration>>,
}

impl ObserverSet {
    pub(crate) fn add(&self, observer: &Arc<dyn ConnectionObserver>) -> ObserverId {
        let id = ObserverId::next();
        self.registrations.lock().push(Registration {
            id,
            observer: Arc::downgrade(observer),
            wants_data: observer.wants_data(),
            gate: Arc::new(DeliveryGate {
                removed: AtomicBool::new(false),
                delivery: ReentrantMutex::new(()),
            }),
        });
        id
    }

    /// Remove a registration. Returns `false` if it was not present.
    ///
    /// Blocks until any callback into this registration that is running on
    /// another thread has returned. Calling it from inside the observer's own
    /// callback is fine.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let gate = {
            let mut registrations = self.registrations.lock();
            let Some(index) = registrations.iter().position(|r| r.id == id) else {
                return false;
            };
            registrations.remove(index).gate
        };

        gate.removed.store(true, Ordering::Release);
        drop(gate.delivery.lock());
        true
    }

    /// Resolve live observers in registration order, pruning dropped ones
    pub(crate) fn live(&self) -> Vec<LiveObserver> {
        let mut registrations = self.registrations.lock();
        registrations.retain(|r| r.observer.strong_count() > 0);
        registrations
            .iter()
            .filter_map(|r| {
                r.observer.upgrade().map(|observer| LiveObserver {
                    id: r.id,
                    observer,
                    wants_data: r.wants_data,
                    gate: Arc::clone(&r.gate),
                })
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.observer.strong_count() > 0)
            .count()
    }
}
