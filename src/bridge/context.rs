//! State owned by the bridge event loop.
//!
//! [`SessionContext`] is the single owner of every piece of bridge state.
//! Behavior is split across `impl SessionContext` blocks:
//!
//! | File | Concern |
//! |------|---------|
//! | `router.rs` | Inbound envelopes |
//! | `session.rs` | Discovery, connect, status, disconnect |
//! | `dispatcher.rs` | Single-flight device operations |
//! | `core.rs` | Event dispatch and teardown |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::{FrameHost, RecipientHandle, ResponseChannel};
use crate::error::{Error, Result};
use crate::identifiers::{MessageId, SessionId, SubscriptionId};
use crate::protocol::Reply;
use crate::status::{StatusEvent, StatusSink};
use crate::transport::{
    ConnectedDevice, DeviceActionState, DeviceManager, DeviceSessionState, DeviceStatus,
    DiscoveredDevice, Signer, Subscription, TransportType,
};

use super::dispatcher::Operation;
use super::governor::AutoCloseGovernor;
use super::options::BridgeOptions;

// ============================================================================
// BridgeEvent
// ============================================================================

/// Internal input to the event loop, produced by subscriptions.
///
/// Each variant carries the ID of the subscription that produced it.
#[derive(Debug)]
pub(crate) enum BridgeEvent {
    /// Discovery item, or `None` when discovery ended.
    Discovered {
        id: SubscriptionId,
        item: Option<Result<DiscoveredDevice>>,
    },
    /// Outcome of a connect attempt.
    Connected {
        id: SubscriptionId,
        result: Result<ConnectedDevice>,
    },
    /// Session state item, or `None` when the stream ended.
    SessionState {
        id: SubscriptionId,
        item: Option<Result<DeviceSessionState>>,
    },
    /// Device-action state, or `None` when the stream ended.
    DeviceAction {
        id: SubscriptionId,
        item: Option<DeviceActionState>,
    },
    /// Countdown tick with whole seconds remaining.
    CountdownTick { id: SubscriptionId, remaining: u64 },
    /// Countdown reached zero.
    AutoCloseExpired { id: SubscriptionId },
}

// ============================================================================
// SessionPhase
// ============================================================================

/// Lifecycle phase of the device session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) enum SessionPhase {
    /// No session and nothing in progress.
    #[default]
    Idle,
    /// Waiting for the first discovered device.
    Discovering,
    /// Connect attempt in flight.
    Connecting,
    /// Session open and the device is usable.
    Connected,
    /// Session open but the device is PIN-locked.
    Locked,
    /// Session being closed.
    Disconnecting,
}

// ============================================================================
// Session
// ============================================================================

/// An open device session.
pub(crate) struct Session {
    /// Handle assigned by the transport.
    pub id: SessionId,
    /// Connected device descriptor.
    pub device: ConnectedDevice,
    /// Latest reported status.
    pub device_status: Option<DeviceStatus>,
    /// Signer bound to the session.
    pub signer: Arc<dyn Signer>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device", &self.device.name)
            .field("device_status", &self.device_status)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ReplyTarget
// ============================================================================

/// Where and how to answer one request.
///
/// Consumed when the reply is sent, so a request cannot be answered twice.
pub(crate) struct ReplyTarget {
    /// `<action>-reply`.
    pub action: String,
    /// Correlation token.
    pub message_id: Option<MessageId>,
    /// Sender captured at request time.
    pub source: Option<RecipientHandle>,
}

impl fmt::Debug for ReplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyTarget")
            .field("action", &self.action)
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

impl ReplyTarget {
    /// Builds the success reply.
    pub fn success(&self, payload: Option<Value>) -> Reply {
        Reply::success(self.action.clone(), self.message_id.clone(), payload)
    }

    /// Builds the failure reply.
    pub fn failure(&self, error: &Error) -> Reply {
        Reply::failure(self.action.clone(), self.message_id.clone(), error)
    }
}

// ============================================================================
// SessionContext
// ============================================================================

/// All bridge state, owned by the event loop task.
pub(crate) struct SessionContext {
    /// Configuration.
    pub options: BridgeOptions,
    /// Device stack.
    pub manager: Arc<dyn DeviceManager>,
    /// Status sink.
    pub status: Arc<dyn StatusSink>,
    /// Hosting frame.
    pub host: Arc<dyn FrameHost>,
    /// Outbound channel.
    pub channel: ResponseChannel,
    /// Sender cloned into every subscription.
    pub events: mpsc::UnboundedSender<BridgeEvent>,
    /// Current transport preference.
    pub transport: TransportType,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Open session, if any.
    pub session: Option<Session>,
    /// Discovery subscription.
    pub discovery: Option<Subscription>,
    /// Connect attempt.
    pub connecting: Option<Subscription>,
    /// Session state subscription.
    pub session_state: Option<Subscription>,
    /// `ledger-make-app` requests waiting for a ready session.
    pub waiters: Vec<ReplyTarget>,
    /// The single pending or in-flight device operation.
    pub operation: Option<Operation>,
    /// Auto-close countdown.
    pub governor: AutoCloseGovernor,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("transport", &self.transport)
            .field("phase", &self.phase)
            .field("session", &self.session)
            .field("waiters", &self.waiters.len())
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Creates the context for a new bridge.
    pub(crate) fn new(
        options: BridgeOptions,
        manager: Arc<dyn DeviceManager>,
        status: Arc<dyn StatusSink>,
        host: Arc<dyn FrameHost>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        let governor = AutoCloseGovernor::new(
            options.auto_close_timeout,
            options.countdown_tick,
            Arc::clone(&status),
            events.clone(),
        );
        Self {
            transport: options.transport,
            options,
            manager,
            status,
            host,
            channel: ResponseChannel::new(),
            events,
            phase: SessionPhase::Idle,
            session: None,
            discovery: None,
            connecting: None,
            session_state: None,
            waiters: Vec::new(),
            operation: None,
            governor,
        }
    }

    /// Publishes a status event.
    #[inline]
    pub(crate) fn publish(&self, event: StatusEvent) {
        self.status.publish(event);
    }

    /// Sends the reply to a request, consuming its target.
    #[inline]
    pub(crate) fn reply(&self, target: ReplyTarget, reply: Reply) {
        self.channel.send(&reply, target.source.as_ref());
    }

    /// Returns `true` if requests are waiting for a ready session.
    pub(crate) fn has_queued_work(&self) -> bool {
        !self.waiters.is_empty() || self.operation.as_ref().is_some_and(Operation::is_queued)
    }
}
