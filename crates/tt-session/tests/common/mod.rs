//! Shared fixtures: a scripted in-memory transport and recording observers

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tt_core::traits::{ChunkReader, ChunkWriter, Connector, CredentialProvider, TransportSession};
use tt_core::{Endpoint, HandshakeError};
use tt_session::status::{ResourceLease, StatusNotice, StatusSink, StatusSlot};
use tt_session::{Connection, ConnectionObserver, LifecycleEvent};

type Inbound = io::Result<Option<Bytes>>;

/// The far end of one scripted session
#[derive(Clone)]
pub struct Remote {
    pub endpoint: Endpoint,
    inbound: mpsc::UnboundedSender<Inbound>,
    written: Arc<Mutex<Vec<u8>>>,
    shut_down: Arc<AtomicBool>,
}

impl Remote {
    pub fn send(&self, data: &str) {
        let _ = self.inbound.send(Ok(Some(Bytes::copy_from_slice(data.as_bytes()))));
    }

    pub fn send_bytes(&self, data: &[u8]) {
        let _ = self.inbound.send(Ok(Some(Bytes::copy_from_slice(data))));
    }

    pub fn eof(&self) {
        let _ = self.inbound.send(Ok(None));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .inbound
            .send(Err(io::Error::new(io::ErrorKind::ConnectionReset, message.to_string())));
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

struct ScriptedReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl ChunkReader for ScriptedReader {
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self.inbound.recv().await {
            Some(item) => item,
            None => Ok(None),
        }
    }
}

struct ScriptedWriter {
    written: Arc<Mutex<Vec<u8>>>,
    shut_down: Arc<AtomicBool>,
    fail_writes: bool,
}

#[async_trait]
impl ChunkWriter for ScriptedWriter {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        self.written.lock().extend_from_slice(data);
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector whose sessions are driven by the test through [`Remote`]s
pub struct ScriptedConnector {
    remotes: Mutex<HashMap<Endpoint, Vec<Remote>>>,
    refused: Mutex<HashSet<Endpoint>>,
    fail_writes: AtomicBool,
    handshakes: AtomicUsize,
    delay: Duration,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Handshakes take `delay` to complete
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            remotes: Mutex::new(HashMap::new()),
            refused: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            handshakes: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn refuse(&self, endpoint: &Endpoint) {
        self.refused.lock().insert(endpoint.clone());
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Most recent session opened to `endpoint`, waiting for it if needed
    pub async fn remote(&self, endpoint: &Endpoint) -> Remote {
        let found = wait_until(|| {
            self.remotes
                .lock()
                .get(endpoint)
                .map(|r| !r.is_empty())
                .unwrap_or(false)
        })
        .await;
        assert!(found, "no session opened to {}", endpoint);

        let remotes = self.remotes.lock();
        remotes[endpoint].last().cloned().unwrap()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn handshake(
        &self,
        endpoint: &Endpoint,
        _credentials: &dyn CredentialProvider,
    ) -> Result<TransportSession, HandshakeError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refused.lock().contains(endpoint) {
            return Err(HandshakeError::Refused(endpoint.to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        let shut_down = Arc::new(AtomicBool::new(false));

        self.remotes
            .lock()
            .entry(endpoint.clone())
            .or_default()
            .push(Remote {
                endpoint: endpoint.clone(),
                inbound: inbound_tx,
                written: Arc::clone(&written),
                shut_down: Arc::clone(&shut_down),
            });

        Ok(TransportSession::new(
            ScriptedReader { inbound: inbound_rx },
            ScriptedWriter {
                written,
                shut_down,
                fail_writes: self.fail_writes.load(Ordering::SeqCst),
            },
        ))
    }
}

/// One observed callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Lifecycle(&'static str),
    Data(String),
}

/// Observer that records everything it is told
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
    errors: Mutex<Vec<String>>,
    data: bool,
}

impl Recorder {
    pub fn lifecycle_only() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_data() -> Arc<Self> {
        Arc::new(Self {
            data: true,
            ..Self::default()
        })
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn lifecycle(&self) -> Vec<&'static str> {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                Seen::Lifecycle(name) => Some(*name),
                Seen::Data(_) => None,
            })
            .collect()
    }

    pub fn data(&self) -> String {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                Seen::Data(text) => Some(text.as_str()),
                Seen::Lifecycle(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn saw(&self, name: &str) -> bool {
        self.lifecycle().iter().any(|n| *n == name)
    }

    pub fn as_observer(self: &Arc<Self>) -> Arc<dyn ConnectionObserver> {
        Arc::clone(self) as Arc<dyn ConnectionObserver>
    }
}

impl ConnectionObserver for Recorder {
    fn on_lifecycle(&self, _connection: &Arc<Connection>, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::ConnectFailed(e) => self.errors.lock().push(e.to_string()),
            LifecycleEvent::StreamFailed(e) => self.errors.lock().push(e.to_string()),
            _ => {}
        }
        self.seen.lock().push(Seen::Lifecycle(event.name()));
    }

    fn on_data(&self, _connection: &Arc<Connection>, data: &Bytes) {
        self.seen
            .lock()
            .push(Seen::Data(String::from_utf8_lossy(data).into_owned()));
    }

    fn wants_data(&self) -> bool {
        self.data
    }
}

/// Lease that counts calls and flags acquire-while-held or release-while-free
#[derive(Default)]
pub struct CheckedLease {
    held: AtomicBool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub violations: AtomicUsize,
}

impl CheckedLease {
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl ResourceLease for CheckedLease {
    fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        if self.held.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        if !self.held.swap(false, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Sink that tracks slot contents and flags clearing an empty slot
#[derive(Default)]
pub struct SlotBoard {
    slots: Mutex<HashMap<StatusSlot, String>>,
    pub violations: AtomicUsize,
}

impl SlotBoard {
    pub fn get(&self, slot: StatusSlot) -> Option<String> {
        self.slots.lock().get(&slot).cloned()
    }

    pub fn count(&self, pred: impl Fn(&StatusSlot) -> bool) -> usize {
        self.slots.lock().keys().filter(|s| pred(s)).count()
    }

    pub fn secondary_count(&self) -> usize {
        self.count(|s| matches!(s, StatusSlot::Secondary(_)))
    }

    pub fn terminated_count(&self) -> usize {
        self.count(|s| matches!(s, StatusSlot::Terminated(_)))
    }
}

impl StatusSink for SlotBoard {
    fn show(&self, slot: StatusSlot, notice: &StatusNotice) {
        self.slots.lock().insert(slot, notice.message.clone());
    }

    fn clear(&self, slot: StatusSlot) {
        if self.slots.lock().remove(&slot).is_none() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Poll `condition` for up to two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
