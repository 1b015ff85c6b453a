//! Resource and status bookkeeping across all connections
//!
//! The [`StatusCoordinator`] is a status keeper: it observes every connection
//! the registry creates and maintains, under one lock,
//!
//! - the set of active (established, not yet terminated) connections,
//! - the resource lease, held exactly while that set is non-empty,
//! - one primary indicator plus a secondary indicator per other active
//!   connection,
//! - "terminated" indicators for connections that ended while nobody was
//!   viewing them.
//!
//! When the primary's connection ends, the first active connection that is
//! being viewed takes over the slot, falling back to the longest-established
//! one. Establishment order is fixed within a run, so the choice is
//! deterministic.
//!
//! Removing an observer never touches indicators; only lifecycle events and
//! [`StatusCoordinator::surface_detached`] do. Each slot is cleared at most
//! once per occupation regardless of the order those arrive in.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use tt_core::{ConnectionId, StreamError};

use super::lease::ResourceLease;
use super::sink::{StatusNotice, StatusSink, StatusSlot};
use crate::connection::Connection;
use crate::observer::ConnectionObserver;

#[derive(Default)]
struct CoordinatorState {
    /// Active connections in establishment order
    active: Vec<Arc<Connection>>,
    primary: Option<ConnectionId>,
    secondaries: BTreeSet<ConnectionId>,
    terminated: HashSet<ConnectionId>,
    lease_held: bool,
}

/// Reference-counts the resource lease and assigns status slots
pub struct StatusCoordinator {
    state: Mutex<CoordinatorState>,
    lease: Arc<dyn ResourceLease>,
    sink: Arc<dyn StatusSink>,
}

impl StatusCoordinator {
    pub fn new(lease: Arc<dyn ResourceLease>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            lease,
            sink,
        }
    }

    /// Connection holding the primary slot
    pub fn primary(&self) -> Option<ConnectionId> {
        self.state.lock().primary
    }

    /// Connections holding secondary slots
    pub fn secondaries(&self) -> Vec<ConnectionId> {
        self.state.lock().secondaries.iter().copied().collect()
    }

    /// Connections with a terminated indicator showing
    pub fn terminated(&self) -> Vec<ConnectionId> {
        self.state.lock().terminated.iter().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn lease_held(&self) -> bool {
        self.state.lock().lease_held
    }

    /// A surface stopped showing `connection` for good. Dismisses its
    /// terminated indicator if it has ended; otherwise does nothing.
    pub fn surface_detached(&self, connection: &Connection) {
        if !connection.is_terminal() {
            return;
        }
        let mut state = self.state.lock();
        if state.terminated.remove(&connection.id()) {
            self.sink.clear(StatusSlot::Terminated(connection.id()));
        }
    }

    /// Retire every indicator and release the lease. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        tracing::debug!(
            "Status coordinator shutting down ({} active)",
            state.active.len()
        );

        if state.primary.take().is_some() {
            self.sink.clear(StatusSlot::Primary);
        }
        for id in std::mem::take(&mut state.secondaries) {
            self.sink.clear(StatusSlot::Secondary(id));
        }
        for id in std::mem::take(&mut state.terminated) {
            self.sink.clear(StatusSlot::Terminated(id));
        }
        state.active.clear();

        if state.lease_held {
            self.lease.release();
            state.lease_held = false;
        }
    }

    fn established(&self, connection: &Arc<Connection>) {
        let id = connection.id();
        let mut state = self.state.lock();
        if state.active.iter().any(|c| c.id() == id) {
            return;
        }
        state.active.push(Arc::clone(connection));

        if !state.lease_held {
            self.lease.acquire();
            state.lease_held = true;
        }

        let notice = StatusNotice::connected(connection.endpoint());
        if state.primary.is_none() {
            state.primary = Some(id);
            self.sink.show(StatusSlot::Primary, &notice);
        } else {
            state.secondaries.insert(id);
            self.sink.show(StatusSlot::Secondary(id), &notice);
        }
    }

    fn ended(&self, connection: &Arc<Connection>, notice: StatusNotice) {
        let id = connection.id();
        let mut state = self.state.lock();
        let Some(index) = state.active.iter().position(|c| c.id() == id) else {
            return;
        };
        state.active.remove(index);

        if state.primary == Some(id) {
            state.primary = None;
            let successor = state
                .active
                .iter()
                .find(|c| c.is_viewed())
                .or_else(|| state.active.first())
                .map(Arc::clone);

            match successor {
                Some(next) => {
                    if state.secondaries.remove(&next.id()) {
                        self.sink.clear(StatusSlot::Secondary(next.id()));
                    }
                    state.primary = Some(next.id());
                    self.sink
                        .show(StatusSlot::Primary, &StatusNotice::connected(next.endpoint()));
                    tracing::debug!("Promoted {} ({}) to primary", next.endpoint(), next.id());
                }
                None => self.sink.clear(StatusSlot::Primary),
            }
        } else if state.secondaries.remove(&id) {
            self.sink.clear(StatusSlot::Secondary(id));
        }

        if !connection.is_viewed() && state.terminated.insert(id) {
            self.sink.show(StatusSlot::Terminated(id), &notice);
        }

        if state.active.is_empty() && state.lease_held {
            self.lease.release();
            state.lease_held = false;
        }
    }
}

impl ConnectionObserver for StatusCoordinator {
    fn on_established(&self, connection: &Arc<Connection>) {
        self.established(connection);
    }

    fn on_failed(&self, connection: &Arc<Connection>, _error: &StreamError) {
        self.ended(connection, StatusNotice::failed(connection.endpoint()));
    }

    fn on_closed(&self, connection: &Arc<Connection>) {
        self.ended(connection, StatusNotice::closed(connection.endpoint()));
    }
}
