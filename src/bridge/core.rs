//! Bridge handle and event loop.
//!
//! [`Bridge`] is a cheap, cloneable handle. The state lives in a single
//! spawned task that owns the [`SessionContext`] and processes one input at
//! a time:
//!
//! - Commands from handles (inbound messages, unload)
//! - Events from subscriptions (discovery, connect, status, device actions,
//!   countdown)
//!
//! The loop ends on unload, on auto-close expiry, or when every handle has
//! been dropped. Teardown cancels all subscriptions before the loop exits.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channel::MessageEvent;
use crate::error::{Error, Result};
use crate::protocol::Notice;
use crate::status::StatusEvent;
use crate::transport::DeviceStatus;

use super::builder::BridgeBuilder;
use super::context::{BridgeEvent, SessionContext};

// ============================================================================
// Types
// ============================================================================

/// Commands sent from handles to the event loop.
enum BridgeCommand {
    /// Route an inbound message.
    Message(MessageEvent),
    /// Tear down, then acknowledge.
    Unload(oneshot::Sender<()>),
}

/// Why the event loop is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Host unloaded the bridge.
    Unload,
    /// Every handle was dropped.
    Detached,
    /// Countdown expired.
    AutoClose,
}

/// Internal shared state for a bridge handle.
struct BridgeInner {
    /// Unique identifier for this bridge.
    uuid: Uuid,
    /// Channel to the event loop.
    commands: mpsc::UnboundedSender<BridgeCommand>,
    /// Flips to `true` when the event loop exits.
    closed: watch::Receiver<bool>,
}

// ============================================================================
// Bridge
// ============================================================================

/// Handle to a running bridge.
///
/// # Example
///
/// ```ignore
/// let bridge = Bridge::builder()
///     .device_manager(manager)
///     .frame_host(host)
///     .spawn()?;
///
/// bridge.post_message(MessageEvent::from_sender(data, reply_tx))?;
/// bridge.unload().await;
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("uuid", &self.inner.uuid)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Bridge - Constructor
// ============================================================================

impl Bridge {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Starts the event loop around a prepared context.
    pub(crate) fn start(
        mut context: SessionContext,
        events: mpsc::UnboundedReceiver<BridgeEvent>,
    ) -> Self {
        let uuid = Uuid::new_v4();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        context.publish(StatusEvent::TransportType(context.transport));
        context.publish(StatusEvent::DeviceStatus(Some(DeviceStatus::NotConnected)));
        context.governor.arm(DeviceStatus::NotConnected);

        tokio::spawn(run_event_loop(context, commands_rx, events, closed_tx));
        info!(%uuid, "Bridge started");

        Self {
            inner: Arc::new(BridgeInner {
                uuid,
                commands: commands_tx,
                closed: closed_rx,
            }),
        }
    }
}

// ============================================================================
// Bridge - Accessors
// ============================================================================

impl Bridge {
    /// Returns the bridge UUID.
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> &Uuid {
        &self.inner.uuid
    }

    /// Returns `true` once the event loop has exited.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow() || self.inner.commands.is_closed()
    }
}

// ============================================================================
// Bridge - Messaging
// ============================================================================

impl Bridge {
    /// Delivers an inbound message event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BridgeClosed`] after teardown.
    pub fn post_message(&self, event: MessageEvent) -> Result<()> {
        self.inner
            .commands
            .send(BridgeCommand::Message(event))
            .map_err(|_| Error::BridgeClosed)
    }
}

// ============================================================================
// Bridge - Lifecycle
// ============================================================================

impl Bridge {
    /// Tears the bridge down as the host page unloads.
    ///
    /// Sends a best-effort `ledger-bridge-close` notice to the last known
    /// sender, closes the session and releases the device stack. Returns
    /// once teardown is complete; a no-op if already closed.
    pub async fn unload(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.commands.send(BridgeCommand::Unload(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        self.closed().await;
    }

    /// Waits until the event loop has exited.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Processes commands and events until teardown.
async fn run_event_loop(
    mut context: SessionContext,
    mut commands: mpsc::UnboundedReceiver<BridgeCommand>,
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
    closed: watch::Sender<bool>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(BridgeCommand::Message(event)) => {
                        context.handle_message(event).await;
                    }

                    Some(BridgeCommand::Unload(ack)) => {
                        context.teardown(Teardown::Unload).await;
                        let _ = ack.send(());
                        break;
                    }

                    None => {
                        debug!("All bridge handles dropped");
                        context.teardown(Teardown::Detached).await;
                        break;
                    }
                }
            }

            Some(event) = events.recv() => {
                if context.handle_event(event).await.is_break() {
                    break;
                }
            }
        }
    }

    commands.close();
    closed.send_replace(true);
    debug!("Event loop terminated");
}

// ============================================================================
// SessionContext - Events
// ============================================================================

impl SessionContext {
    /// Dispatches one subscription event.
    async fn handle_event(&mut self, event: BridgeEvent) -> ControlFlow<()> {
        match event {
            BridgeEvent::Discovered { id, item } => self.on_discovered(id, item),
            BridgeEvent::Connected { id, result } => self.on_connected(id, result).await,
            BridgeEvent::SessionState { id, item } => self.on_session_state(id, item).await,
            BridgeEvent::DeviceAction { id, item } => self.on_device_action(id, item),
            BridgeEvent::CountdownTick { id, remaining } => self.governor.on_tick(id, remaining),
            BridgeEvent::AutoCloseExpired { id } => {
                if let Some(status) = self.governor.expire(id) {
                    info!(%status, "Auto-closing bridge after device timeout");
                    self.abort_outstanding("Auto-close timeout");
                    self.channel.notify(&Notice::auto_close(status.as_str()));
                    self.teardown(Teardown::AutoClose).await;
                    self.host.close();
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Cancels everything and releases the device stack.
    ///
    /// Outstanding requests are dropped without replies.
    async fn teardown(&mut self, reason: Teardown) {
        debug!(?reason, "Tearing down bridge");
        self.governor.disarm();
        if reason == Teardown::Unload {
            self.channel.notify(&Notice::close());
        }

        self.discovery = None;
        self.connecting = None;
        self.session_state = None;
        self.operation = None;
        self.waiters.clear();

        if let Some(session) = self.session.take()
            && let Err(e) = self.manager.disconnect(&session.id).await
        {
            debug!(session_id = %session.id, error = %e, "Failed to close session on teardown");
        }
        self.manager.close().await;
        info!(?reason, "Bridge closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
