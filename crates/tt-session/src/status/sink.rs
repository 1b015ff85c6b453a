//! User-visible status indicators

use std::fmt;

use tt_core::{ConnectionId, Endpoint};

/// Where an indicator is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSlot {
    /// The single most prominent indicator
    Primary,
    /// A lesser "connected" indicator for one connection
    Secondary(ConnectionId),
    /// A dismissible "terminated" indicator for one connection
    Terminated(ConnectionId),
}

impl fmt::Display for StatusSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSlot::Primary => write!(f, "primary"),
            StatusSlot::Secondary(id) => write!(f, "secondary/{}", id),
            StatusSlot::Terminated(id) => write!(f, "terminated/{}", id),
        }
    }
}

/// What an indicator says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Connected,
    Failed,
    Closed,
}

/// Content of one indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotice {
    pub endpoint: Endpoint,
    pub kind: NoticeKind,
    pub message: String,
    /// Persistent indicators cannot be dismissed by the user
    pub persistent: bool,
}

impl StatusNotice {
    pub fn connected(endpoint: &Endpoint) -> Self {
        Self {
            endpoint: endpoint.clone(),
            kind: NoticeKind::Connected,
            message: format!("Connected to {}", endpoint),
            persistent: true,
        }
    }

    pub fn failed(endpoint: &Endpoint) -> Self {
        Self {
            endpoint: endpoint.clone(),
            kind: NoticeKind::Failed,
            message: format!("Connection to {} failed", endpoint),
            persistent: false,
        }
    }

    pub fn closed(endpoint: &Endpoint) -> Self {
        Self {
            endpoint: endpoint.clone(),
            kind: NoticeKind::Closed,
            message: format!("Connection to {} closed", endpoint),
            persistent: false,
        }
    }
}

/// Renders status indicators.
///
/// Calls arrive serialized, one slot at a time. `show` on an occupied slot
/// replaces its content.
pub trait StatusSink: Send + Sync {
    fn show(&self, slot: StatusSlot, notice: &StatusNotice);
    fn clear(&self, slot: StatusSlot);
}

/// Sink that reports indicator changes through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn show(&self, slot: StatusSlot, notice: &StatusNotice) {
        tracing::info!("[{}] {}", slot, notice.message);
    }

    fn clear(&self, slot: StatusSlot) {
        tracing::debug!("[{}] cleared", slot);
    }
}
