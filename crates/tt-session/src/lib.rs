//! tt-session: Connection multiplexing and observer fan-out for tether
//!
//! This crate holds everything between a transport and a user-facing
//! surface:
//!
//! - [`Connection`]: one transport session to one endpoint, its state
//!   machine and its [`ConsoleBuffer`]
//! - [`ConnectionRegistry`]: endpoint-keyed dedup of connections
//! - [`ConnectionObserver`]: lifecycle and data callbacks, fanned out per
//!   connection
//! - [`UpdateCoalescer`]: debounced refresh scheduling for surfaces
//! - [`StatusCoordinator`]: resource lease and status indicator bookkeeping
//! - [`ShellService`]: the registry and coordinator wired together

pub mod coalescer;
pub mod connection;
pub mod console;
pub mod observer;
pub mod registry;
pub mod service;
pub mod status;

pub use coalescer::{ChannelDispatcher, Dispatcher, InlineDispatcher, RefreshJob, UpdateCoalescer};
pub use connection::Connection;
pub use console::{ConsoleBuffer, ConsoleSnapshot};
pub use observer::{ConnectionObserver, LifecycleEvent, ObserverId};
pub use registry::{Attachment, ConnectionRegistry};
pub use service::ShellService;
pub use status::{StatusCoordinator, StatusSink, StatusSlot};
