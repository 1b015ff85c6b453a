//! Interactive terminal surface
//!
//! Shows one connection's console on stdout and feeds stdin lines to it.
//! Output arriving from the connection only marks the surface dirty; the
//! [`UpdateCoalescer`] turns that into at most one redraw per refresh
//! interval, run on the surface's own loop through a [`ChannelDispatcher`].
//!
//! Input lines starting with `~` are local escapes:
//!
//! | line | action |
//! |---|---|
//! | `~.` | detach, leaving the connection open for other observers |
//! | `~p` | pause or resume output |
//! | `~q` | close the connection |

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tt_session::{
    ChannelDispatcher, Connection, ConnectionObserver, LifecycleEvent, RefreshJob, UpdateCoalescer,
};

use crate::output::{print_error, print_info, print_success, print_warning};

/// Why the surface loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceExit {
    /// The user detached; the connection may still be open
    Detached,
    /// The connection closed
    Closed,
    /// The connection failed
    Failed,
}

/// Writes the part of a console the user has not seen yet
pub struct ConsoleRenderer {
    target: Mutex<Option<Arc<Connection>>>,
    shown: Mutex<u64>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleRenderer {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            target: Mutex::new(None),
            shown: Mutex::new(0),
            out: Mutex::new(out),
        }
    }

    /// Render `connection` from now on
    pub fn bind(&self, connection: &Arc<Connection>) {
        *self.target.lock() = Some(Arc::clone(connection));
    }

    /// Write everything appended since the last render
    pub fn render(&self) {
        let Some(connection) = self.target.lock().clone() else {
            return;
        };
        let snapshot = connection.console().snapshot();

        let mut shown = self.shown.lock();
        let mut out = self.out.lock();
        if snapshot.start_offset() > *shown {
            let _ = writeln!(
                out,
                "[... {} bytes of output dropped ...]",
                snapshot.start_offset() - *shown
            );
        }
        let _ = out.write_all(snapshot.since(*shown).as_bytes());
        let _ = out.flush();
        *shown = snapshot.end_offset();
    }
}

/// The observer half of a surface: turns callbacks into redraws and events
pub struct InteractiveSurface {
    coalescer: UpdateCoalescer,
    renderer: Arc<ConsoleRenderer>,
    lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
}

/// The loop half of a surface: owned by [`InteractiveSurface::run`]
pub struct SurfaceLoop {
    jobs: mpsc::UnboundedReceiver<RefreshJob>,
    lifecycle: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl InteractiveSurface {
    /// Create a surface redrawing into `out` at most once per `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(interval: Duration, out: Box<dyn Write + Send>) -> (Arc<Self>, SurfaceLoop) {
        let (dispatcher, jobs) = ChannelDispatcher::channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let renderer = Arc::new(ConsoleRenderer::new(out));

        let redraw = Arc::clone(&renderer);
        let coalescer = UpdateCoalescer::new(interval, Arc::new(dispatcher), move || redraw.render());

        let surface = Arc::new(Self {
            coalescer,
            renderer,
            lifecycle: lifecycle_tx,
        });
        (
            surface,
            SurfaceLoop {
                jobs,
                lifecycle: lifecycle_rx,
            },
        )
    }

    pub fn renderer(&self) -> &Arc<ConsoleRenderer> {
        &self.renderer
    }

    /// Pause or resume redraws. Output keeps accumulating while paused and
    /// is drawn in one go on resume.
    pub fn set_paused(&self, paused: bool) {
        self.coalescer.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.coalescer.is_paused()
    }

    /// Drive the surface until the user detaches or the connection ends
    pub async fn run(&self, connection: &Arc<Connection>, mut ui: SurfaceLoop) -> SurfaceExit {
        self.renderer.bind(connection);
        if !self.is_paused() {
            connection.set_viewed(true);
        }

        let mut input = spawn_input_reader();
        let mut stdin_open = true;

        let exit = loop {
            tokio::select! {
                Some(job) = ui.jobs.recv() => job(),

                Some(event) = ui.lifecycle.recv() => {
                    if let Some(exit) = report(connection, &event) {
                        break exit;
                    }
                }

                line = input.recv(), if stdin_open => match line {
                    Some(line) => {
                        if let Some(exit) = self.handle_line(connection, &line) {
                            break exit;
                        }
                    }
                    // Input exhausted; keep showing output until the connection ends
                    None => stdin_open = false,
                },

                _ = tokio::signal::ctrl_c() => {
                    if let Err(e) = connection.send_interrupt() {
                        print_warning(&e.to_string());
                    }
                }
            }
        };

        // Show whatever arrived before the connection ended
        self.coalescer.cancel();
        self.renderer.render();
        if !self.is_paused() {
            connection.set_viewed(false);
        }
        exit
    }

    fn handle_line(&self, connection: &Arc<Connection>, line: &str) -> Option<SurfaceExit> {
        match line.trim() {
            "~." => return Some(SurfaceExit::Detached),
            "~q" => {
                connection.close();
                return None;
            }
            "~p" => {
                let paused = !self.is_paused();
                self.set_paused(paused);
                connection.set_viewed(!paused);
                print_info(if paused { "Output paused" } else { "Output resumed" });
                return None;
            }
            _ => {}
        }

        if let Err(e) = connection.queue_command(line) {
            print_warning(&e.to_string());
        }
        None
    }
}

/// Read stdin lines on a detached thread so exit never waits on a read
fn spawn_input_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Tell the user about a lifecycle event; `Some` if the surface should stop
fn report(connection: &Connection, event: &LifecycleEvent) -> Option<SurfaceExit> {
    let endpoint = connection.endpoint();
    match event {
        LifecycleEvent::Established => {
            print_success(&format!("Connected to {}", endpoint));
            None
        }
        LifecycleEvent::ConnectFailed(e) => {
            print_error(&format!("Could not connect to {}: {}", endpoint, e));
            Some(SurfaceExit::Failed)
        }
        LifecycleEvent::StreamFailed(e) => {
            print_error(&format!("Connection to {} failed: {}", endpoint, e));
            Some(SurfaceExit::Failed)
        }
        LifecycleEvent::Closed => {
            print_info(&format!("Connection to {} closed", endpoint));
            Some(SurfaceExit::Closed)
        }
    }
}

impl ConnectionObserver for InteractiveSurface {
    fn on_lifecycle(&self, _connection: &Arc<Connection>, event: &LifecycleEvent) {
        self.coalescer.mark_dirty();
        let _ = self.lifecycle.send(event.clone());
    }

    fn on_data(&self, _connection: &Arc<Connection>, _data: &Bytes) {
        self.coalescer.mark_dirty();
    }

    fn wants_data(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tt_core::traits::{Connector, CredentialProvider, NoCredentials, TransportSession};
    use tt_core::{Endpoint, HandshakeError};

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

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn connection(capacity: usize) -> Arc<Connection> {
        Connection::new(
            Endpoint::new("10.0.0.5", 5555),
            Arc::new(StalledConnector),
            Arc::new(NoCredentials),
            capacity,
        )
    }

    #[test]
    fn test_renderer_writes_only_new_output() {
        let buf = SharedBuf::default();
        let renderer = ConsoleRenderer::new(Box::new(buf.clone()));
        let conn = connection(1024);
        renderer.bind(&conn);

        conn.console().append("$ ls\n");
        renderer.render();
        conn.console().append("bin\n");
        renderer.render();
        renderer.render();

        assert_eq!(buf.text(), "$ ls\nbin\n");
    }

    #[test]
    fn test_renderer_reports_dropped_output() {
        let buf = SharedBuf::default();
        let renderer = ConsoleRenderer::new(Box::new(buf.clone()));
        let conn = connection(4);
        renderer.bind(&conn);

        conn.console().append("0123456789");
        renderer.render();

        assert_eq!(buf.text(), "[... 6 bytes of output dropped ...]\n6789");
    }

    #[test]
    fn test_unbound_renderer_is_silent() {
        let buf = SharedBuf::default();
        let renderer = ConsoleRenderer::new(Box::new(buf.clone()));
        renderer.render();
        assert!(buf.text().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_marks_redraw_on_surface_loop() {
        let buf = SharedBuf::default();
        let (surface, mut ui) = InteractiveSurface::new(Duration::from_millis(250), Box::new(buf.clone()));
        let conn = connection(1024);
        surface.renderer().bind(&conn);

        for chunk in ["a", "b", "c"] {
            conn.console().append(chunk);
            surface.on_data(&conn, &Bytes::from_static(b"x"));
        }

        let job = ui.jobs.recv().await.unwrap();
        job();
        assert_eq!(buf.text(), "abc");
        assert!(ui.jobs.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_surface_defers_redraw() {
        let buf = SharedBuf::default();
        let (surface, mut ui) = InteractiveSurface::new(Duration::from_millis(250), Box::new(buf.clone()));
        let conn = connection(1024);
        surface.renderer().bind(&conn);

        surface.set_paused(true);
        conn.console().append("hidden until resume");
        surface.on_data(&conn, &Bytes::from_static(b"x"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(ui.jobs.try_recv().is_err());

        surface.set_paused(false);
        let job = ui.jobs.recv().await.unwrap();
        job();
        assert_eq!(buf.text(), "hidden until resume");
    }

    #[tokio::test]
    async fn test_lifecycle_is_forwarded() {
        let (surface, mut ui) = InteractiveSurface::new(Duration::from_millis(250), Box::new(SharedBuf::default()));
        let conn = connection(1024);

        surface.on_lifecycle(&conn, &LifecycleEvent::Closed);
        let event = ui.lifecycle.recv().await.unwrap();
        assert!(matches!(event, LifecycleEvent::Closed));
        assert_eq!(report(&conn, &event), Some(SurfaceExit::Closed));
    }
}
