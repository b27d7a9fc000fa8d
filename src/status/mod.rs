//! Status publishing.
//!
//! The bridge reports its state through a one-way [`StatusSink`]. Sinks
//! never feed anything back; the bridge's own state stays authoritative.
//!
//! # Sinks
//!
//! | Sink | Behavior |
//! |------|----------|
//! | [`TracingSink`] | Logs each event (default) |
//! | [`StatusStore`] | Reduces events into a [`StatusSnapshot`] |
//! | `UnboundedSender<StatusEvent>` | Forwards events to a channel |

// ============================================================================
// Submodules
// ============================================================================

/// Snapshot store.
pub mod store;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::identifiers::SessionId;
use crate::transport::{ConnectedDevice, DeviceActionState, DeviceStatus, TransportType};

// ============================================================================
// Re-exports
// ============================================================================

pub use store::{StatusSnapshot, StatusStore};

// ============================================================================
// Constants
// ============================================================================

/// Action-state label when nothing is running.
pub const ACTION_NONE: &str = "none";

/// Action-state label while a session is being set up.
pub const ACTION_CONNECTING: &str = "Connecting";

/// Action-state label while queued work waits for a PIN.
pub const ACTION_WAIT_FOR_UNLOCK: &str = "Wait for Unlock";

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Coarse connection state shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionStatus {
    /// No session.
    #[default]
    Disconnected,
    /// Discovery or connect in progress.
    Connecting,
    /// Session open.
    Connected,
    /// Discovery or connect failed.
    Error,
}

impl ConnectionStatus {
    /// Returns the display name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Error => "Error",
        }
    }

    /// Returns `true` only for [`ConnectionStatus::Connected`].
    #[inline]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Countdown
// ============================================================================

/// Auto-close countdown value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Countdown {
    /// Governor disarmed.
    #[default]
    Inactive,
    /// Whole seconds until auto-close.
    Remaining(u64),
}

impl Countdown {
    /// Returns the seconds remaining, if armed.
    #[inline]
    #[must_use]
    pub const fn seconds(&self) -> Option<u64> {
        match self {
            Self::Inactive => None,
            Self::Remaining(seconds) => Some(*seconds),
        }
    }
}

impl Serialize for Countdown {
    /// Serializes as seconds, or `-1` when inactive.
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Inactive => serializer.serialize_i64(-1),
            Self::Remaining(seconds) => serializer.serialize_u64(*seconds),
        }
    }
}

// ============================================================================
// StatusEvent
// ============================================================================

/// One status update published by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum StatusEvent {
    /// Connection state changed.
    ConnectionStatus(ConnectionStatus),
    /// Connected device descriptor, `None` after disconnect.
    ConnectedDevice(Option<ConnectedDevice>),
    /// Session handle, `None` after disconnect.
    SessionId(Option<SessionId>),
    /// Human-readable label of the running action.
    ActionState(String),
    /// Device status, `None` after disconnect.
    DeviceStatus(Option<DeviceStatus>),
    /// Transport preference changed.
    TransportType(TransportType),
    /// Last error message, `None` when cleared.
    Error(Option<String>),
    /// Auto-close countdown.
    TimeLeft(Countdown),
    /// Non-terminal progress of the running device action.
    DeviceAction(DeviceActionState),
}

impl StatusEvent {
    /// Creates an action-state event.
    #[inline]
    #[must_use]
    pub fn action_state(label: impl Into<String>) -> Self {
        Self::ActionState(label.into())
    }

    /// Creates an error event.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(Some(message.into()))
    }
}

// ============================================================================
// StatusSink
// ============================================================================

/// Receiver of status events.
pub trait StatusSink: Send + Sync {
    /// Publishes an event. Must not block.
    fn publish(&self, event: StatusEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn publish(&self, event: StatusEvent) {
        match &event {
            StatusEvent::TimeLeft(_) | StatusEvent::DeviceAction(_) => {
                trace!(?event, "Status");
            }
            _ => debug!(?event, "Status"),
        }
    }
}

impl StatusSink for mpsc::UnboundedSender<StatusEvent> {
    fn publish(&self, event: StatusEvent) {
        let _ = self.send(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
