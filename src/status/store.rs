//! In-memory status snapshot.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::identifiers::SessionId;
use crate::transport::{ConnectedDevice, DeviceActionState, DeviceStatus, TransportType};

use super::{ACTION_NONE, ConnectionStatus, Countdown, StatusEvent, StatusSink};

// ============================================================================
// StatusSnapshot
// ============================================================================

/// Latest value of every status field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Coarse connection state.
    pub connection_status: ConnectionStatus,
    /// Connected device descriptor.
    pub connected_device: Option<ConnectedDevice>,
    /// Session handle.
    pub session_id: Option<SessionId>,
    /// Running action label.
    pub action_state: String,
    /// Device status.
    pub device_status: Option<DeviceStatus>,
    /// Transport preference.
    pub transport_type: TransportType,
    /// Last error message.
    pub error: Option<String>,
    /// Auto-close countdown.
    pub time_left: Countdown,
    /// Progress of the running device action.
    pub device_action: Option<DeviceActionState>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            connection_status: ConnectionStatus::default(),
            connected_device: None,
            session_id: None,
            action_state: ACTION_NONE.to_string(),
            device_status: None,
            transport_type: TransportType::default(),
            error: None,
            time_left: Countdown::Inactive,
            device_action: None,
        }
    }
}

impl StatusSnapshot {
    /// Applies one event.
    pub fn apply(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::ConnectionStatus(status) => self.connection_status = status,
            StatusEvent::ConnectedDevice(device) => self.connected_device = device,
            StatusEvent::SessionId(id) => self.session_id = id,
            StatusEvent::ActionState(label) => {
                if label == ACTION_NONE {
                    self.device_action = None;
                }
                self.action_state = label;
            }
            StatusEvent::DeviceStatus(status) => self.device_status = status,
            StatusEvent::TransportType(transport) => self.transport_type = transport,
            StatusEvent::Error(message) => self.error = message,
            StatusEvent::TimeLeft(countdown) => self.time_left = countdown,
            StatusEvent::DeviceAction(state) => self.device_action = Some(state),
        }
    }
}

// ============================================================================
// StatusStore
// ============================================================================

/// Thread-safe [`StatusSink`] holding the latest [`StatusSnapshot`].
///
/// Cloning shares the underlying snapshot.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }

    /// Returns the countdown without cloning the whole snapshot.
    #[inline]
    #[must_use]
    pub fn time_left(&self) -> Countdown {
        self.inner.read().time_left
    }
}

impl StatusSink for StatusStore {
    fn publish(&self, event: StatusEvent) {
        self.inner.write().apply(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
