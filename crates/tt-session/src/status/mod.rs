//! Resource lease and status indicator management

mod coordinator;
mod lease;
mod sink;

pub use coordinator::StatusCoordinator;
pub use lease::{default_keepalive_path, read_pid_file, NoopLease, PidFileLease, ResourceLease};
pub use sink::{LogStatusSink, NoticeKind, StatusNotice, StatusSink, StatusSlot};
