//! A single logical connection to one endpoint
//!
//! A [`Connection`] owns the transport session for one endpoint, its console
//! buffer and its observer set. `start_connect` spawns the connection task:
//! handshake, then a read loop on the task itself and a writer task fed by
//! `queue_write`.
//!
//! # Event delivery
//!
//! Every lifecycle and data event goes through one per-connection delivery
//! gate. Events raised while a fan-out is already running on the same thread
//! (an observer closing the connection from its own callback, say) are queued
//! and delivered after the current event has reached every observer, so all
//! observers see the same sequence.

use std::collections::VecDeque;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tt_core::traits::{ChunkReader, ChunkWriter, Connector, CredentialProvider, TransportSession};
use tt_core::{ConnectionError, ConnectionId, ConnectionState, Endpoint, StreamError};

use crate::console::ConsoleBuffer;
use crate::observer::{ConnectionObserver, LifecycleEvent, ObserverId, ObserverSet};

/// Run once after a connection's terminal event has been delivered
pub(crate) type TerminatedHook = Box<dyn FnOnce(&Arc<Connection>) + Send>;

enum Event {
    Lifecycle(LifecycleEvent),
    Data(Bytes),
}

#[derive(Default)]
struct EventQueue {
    dispatching: bool,
    pending: VecDeque<Event>,
}

struct Inner {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
}

/// One logical connection to an endpoint
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    inner: Mutex<Inner>,
    events: ReentrantMutex<RefCell<EventQueue>>,
    started: AtomicBool,
    viewers: AtomicUsize,
    console: ConsoleBuffer,
    observers: ObserverSet,
    cancel: CancellationToken,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    terminated_hook: Mutex<Option<TerminatedHook>>,
}

impl Connection {
    /// Create a connection in the `Connecting` state. Nothing happens on the
    /// network until [`start_connect`](Self::start_connect).
    pub fn new(
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        console_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            endpoint,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                outbound: None,
            }),
            events: ReentrantMutex::new(RefCell::new(EventQueue::default())),
            started: AtomicBool::new(false),
            viewers: AtomicUsize::new(0),
            console: ConsoleBuffer::new(console_capacity),
            observers: ObserverSet::default(),
            cancel: CancellationToken::new(),
            connector,
            credentials,
            terminated_hook: Mutex::new(None),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Whether the connection is `Closed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Output received so far
    pub fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    /// Report that a surface started (`true`) or stopped (`false`) showing
    /// this connection. Calls are counted, so two surfaces viewing the same
    /// connection each report their own start and stop.
    pub fn set_viewed(&self, viewed: bool) {
        if viewed {
            self.viewers.fetch_add(1, Ordering::AcqRel);
        } else {
            let _ = self
                .viewers
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }

    /// Whether any surface is currently showing this connection
    pub fn is_viewed(&self) -> bool {
        self.viewers.load(Ordering::Acquire) > 0
    }

    /// Register an observer. Holds it weakly.
    pub fn add_observer(&self, observer: &Arc<dyn ConnectionObserver>) -> ObserverId {
        let id = self.observers.add(observer);
        tracing::debug!("Observer {:?} attached to {} ({})", id, self.endpoint, self.id);
        id
    }

    /// Remove an observer. Once this returns the observer gets no further
    /// callbacks from this connection. Never closes the connection.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let removed = self.observers.remove(id);
        if removed {
            tracing::debug!("Observer {:?} detached from {} ({})", id, self.endpoint, self.id);
        }
        removed
    }

    /// Register an observer unless the connection has already terminated.
    ///
    /// Serialized with event delivery: an observer attached here either sees
    /// the terminal event or is refused.
    pub(crate) fn attach_if_live(&self, observer: &Arc<dyn ConnectionObserver>) -> Option<ObserverId> {
        let _gate = self.events.lock();
        if self.is_terminal() {
            return None;
        }
        Some(self.add_observer(observer))
    }

    /// Number of live observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Begin the handshake and read loop on the current Tokio runtime.
    ///
    /// Returns immediately. A second call fails with `AlreadyStarted`.
    pub fn start_connect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ConnectionError::AlreadyStarted(self.endpoint.to_string()));
        }

        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.run().await });
        Ok(())
    }

    /// Queue bytes for the remote. Writes go out in call order.
    pub fn queue_write(&self, data: impl Into<Bytes>) -> Result<(), ConnectionError> {
        let not_connected = || ConnectionError::NotConnected(self.endpoint.to_string());

        let inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return Err(not_connected());
        }
        let outbound = inner.outbound.as_ref().ok_or_else(not_connected)?;
        outbound.send(data.into()).map_err(|_| not_connected())
    }

    /// Queue a command line; a trailing newline is added
    pub fn queue_command(&self, command: &str) -> Result<(), ConnectionError> {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        self.queue_write(line)
    }

    /// Send an interrupt (Ctrl+C) to the remote shell
    pub fn send_interrupt(&self) -> Result<(), ConnectionError> {
        self.queue_write(Bytes::from_static(&[0x03]))
    }

    /// Close the connection.
    ///
    /// Idempotent: only the call that performs the transition emits `Closed`.
    /// Closing while the handshake is still running abandons it. Returns
    /// whether this call closed the connection.
    pub fn close(self: &Arc<Self>) -> bool {
        self.finish(ConnectionState::Closed, LifecycleEvent::Closed)
    }

    pub(crate) fn set_terminated_hook(&self, hook: TerminatedHook) {
        *self.terminated_hook.lock() = Some(hook);
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("Connecting to {} ({})", self.endpoint, self.id);

        let handshake = self
            .connector
            .handshake(&self.endpoint, self.credentials.as_ref());
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("Handshake with {} abandoned", self.endpoint);
                return;
            }
            result = handshake => result,
        };

        let TransportSession { mut reader, mut writer } = match result {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Handshake with {} failed: {}", self.endpoint, e);
                self.finish(
                    ConnectionState::Failed,
                    LifecycleEvent::ConnectFailed(Arc::new(e)),
                );
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        if !self.establish(outbound_tx) {
            // Closed while the handshake was completing
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Transport shutdown for {} failed: {}", self.endpoint, e);
            }
            return;
        }

        let writer_task = tokio::spawn(Arc::clone(&self).write_loop(writer, outbound_rx));
        self.read_loop(reader.as_mut()).await;

        self.cancel.cancel();
        if let Err(e) = writer_task.await {
            tracing::error!("Writer task for {} panicked: {}", self.endpoint, e);
        }
        tracing::debug!("Connection task for {} ({}) exiting", self.endpoint, self.id);
    }

    async fn read_loop(self: &Arc<Self>, reader: &mut dyn ChunkReader) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = reader.read_chunk() => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    tracing::trace!("{} bytes from {}", chunk.len(), self.endpoint);
                    self.deliver_data(chunk);
                }
                Ok(None) => {
                    tracing::info!("{} closed the session", self.endpoint);
                    self.finish(ConnectionState::Closed, LifecycleEvent::Closed);
                    return;
                }
                Err(e) => {
                    tracing::warn!("Read from {} failed: {}", self.endpoint, e);
                    self.finish(
                        ConnectionState::Failed,
                        LifecycleEvent::StreamFailed(Arc::new(StreamError::Read(e))),
                    );
                    return;
                }
            }
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: Box<dyn ChunkWriter>,
        mut outbound: mpsc::UnboundedReceiver<Bytes>,
    ) {
        loop {
            let data = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = outbound.recv() => match next {
                    Some(data) => data,
                    None => break,
                },
            };

            if let Err(e) = writer.write(&data).await {
                tracing::warn!("Write to {} failed: {}", self.endpoint, e);
                self.finish(
                    ConnectionState::Failed,
                    LifecycleEvent::StreamFailed(Arc::new(StreamError::Write(e))),
                );
                break;
            }
        }

        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Transport shutdown for {} failed: {}", self.endpoint, e);
        }
    }

    /// `Connecting -> Connected`. Returns `false` if the connection was
    /// closed first.
    fn establish(self: &Arc<Self>, outbound: mpsc::UnboundedSender<Bytes>) -> bool {
        let _gate = self.events.lock();
        {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Connecting {
                return false;
            }
            inner.state = ConnectionState::Connected;
            inner.outbound = Some(outbound);
        }

        tracing::info!("Connected to {} ({})", self.endpoint, self.id);
        self.emit(Event::Lifecycle(LifecycleEvent::Established));
        true
    }

    fn deliver_data(self: &Arc<Self>, chunk: Bytes) {
        let _gate = self.events.lock();
        if self.state() != ConnectionState::Connected {
            return;
        }
        self.console.append_bytes(&chunk);
        self.emit(Event::Data(chunk));
    }

    /// Move to a terminal state and emit its event, once
    fn finish(self: &Arc<Self>, next: ConnectionState, event: LifecycleEvent) -> bool {
        let _gate = self.events.lock();
        let (previous, outbound) = {
            let mut inner = self.inner.lock();
            if !inner.state.can_transition_to(next) {
                return false;
            }
            let previous = inner.state;
            inner.state = next;
            (previous, inner.outbound.take())
        };
        drop(outbound);
        self.cancel.cancel();

        tracing::info!(
            "Connection to {} ({}) {} -> {} ({})",
            self.endpoint,
            self.id,
            previous,
            next,
            event.name()
        );
        self.emit(Event::Lifecycle(event));
        true
    }

    fn emit(self: &Arc<Self>, event: Event) {
        let queue = self.events.lock();
        {
            let mut queue = queue.borrow_mut();
            queue.pending.push_back(event);
            if queue.dispatching {
                return;
            }
            queue.dispatching = true;
        }

        loop {
            let next = queue.borrow_mut().pending.pop_front();
            match next {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
        queue.borrow_mut().dispatching = false;
    }

    fn dispatch(self: &Arc<Self>, event: Event) {
        match event {
            Event::Data(chunk) => {
                for observer in self.observers.live() {
                    if observer.wants_data() {
                        observer.deliver("data", |o| o.on_data(self, &chunk));
                    }
                }
            }
            Event::Lifecycle(event) => {
                for observer in self.observers.live() {
                    observer.deliver(event.name(), |o| o.on_lifecycle(self, &event));
                }

                if event.is_terminal() {
                    let hook = self.terminated_hook.lock().take();
                    if let Some(hook) = hook {
                        hook(self);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("viewed", &self.is_viewed())
            .finish_non_exhaustive()
    }
}
