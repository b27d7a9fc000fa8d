//! Session lifecycle: discovery, connect, device status and disconnect.
//!
//! ```text
//! Idle ──► Discovering ──► Connecting ──► Connected ⇄ Locked
//!  ▲            │               │              │
//!  └── failure ─┴───────────────┘              ▼
//!  └─────────────────────────────────── Disconnecting
//! ```
//!
//! Without a session, requests that need a device queue up until it first
//! reports `CONNECTED`. An open session runs them at once. Discovery or
//! connect failures fail every queued request, and so does losing the
//! status stream.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::status::{
    ACTION_CONNECTING, ACTION_NONE, ACTION_WAIT_FOR_UNLOCK, ConnectionStatus, StatusEvent,
};
use crate::transport::{
    ConnectedDevice, DeviceSessionState, DeviceStatus, DiscoveredDevice, Subscription,
    TransportType,
};

use super::context::{BridgeEvent, ReplyTarget, Session, SessionContext, SessionPhase};

// ============================================================================
// SessionContext - Session Readiness
// ============================================================================

impl SessionContext {
    /// Makes sure a session exists or is being opened.
    ///
    /// With an open session, queued work runs immediately. Otherwise
    /// discovery starts unless an attempt is already under way.
    pub(crate) fn ensure_session(&mut self) {
        if self.session.is_some() {
            self.run_queued_work();
            return;
        }
        if self.phase == SessionPhase::Idle {
            self.start_discovery();
        } else {
            trace!(phase = ?self.phase, "Session attempt already in progress");
        }
    }

    /// Answers `ledger-make-app` once a session is ready.
    pub(crate) fn make_app(&mut self, target: ReplyTarget) {
        self.waiters.push(target);
        self.ensure_session();
    }

    /// Releases everything queued on session readiness.
    pub(crate) fn run_queued_work(&mut self) {
        for waiter in std::mem::take(&mut self.waiters) {
            let reply = waiter.success(None);
            self.reply(waiter, reply);
        }
        self.start_operation();
    }

    fn fail_queued_work(&mut self, error: &Error) {
        for waiter in std::mem::take(&mut self.waiters) {
            let reply = waiter.failure(error);
            self.reply(waiter, reply);
        }
        self.fail_queued_operation(error);
    }
}

// ============================================================================
// SessionContext - Discovery and Connect
// ============================================================================

impl SessionContext {
    /// Starts discovery on the current transport, replacing any previous
    /// discovery.
    pub(crate) fn start_discovery(&mut self) {
        self.discovery = None;
        self.phase = SessionPhase::Discovering;
        debug!(transport = %self.transport, "Starting discovery");

        self.publish(StatusEvent::ConnectionStatus(ConnectionStatus::Connecting));
        self.publish(StatusEvent::action_state(ACTION_CONNECTING));

        let stream = self.manager.start_discovering(self.transport);
        self.discovery = Some(Subscription::forward(
            "discovery",
            stream,
            self.events.clone(),
            |id, item| BridgeEvent::Discovered { id, item },
        ));
    }

    /// Handles one discovery item.
    pub(crate) fn on_discovered(&mut self, id: SubscriptionId, item: Option<Result<DiscoveredDevice>>) {
        if self.discovery.as_ref().map(Subscription::id) != Some(id) {
            trace!(%id, "Dropping stale discovery event");
            return;
        }
        self.discovery = None;

        match item {
            Some(Ok(device)) => self.connect(device),
            Some(Err(e)) => self.on_connection_failed(e),
            None => self.on_connection_failed(Error::transport("No device discovered")),
        }
    }

    fn connect(&mut self, device: DiscoveredDevice) {
        debug!(device = %device.name, transport = %device.transport, "Connecting to device");
        self.phase = SessionPhase::Connecting;

        let manager = Arc::clone(&self.manager);
        let events = self.events.clone();
        self.connecting = Some(Subscription::spawn("connect", move |id| async move {
            let result = manager.connect(device).await;
            let _ = events.send(BridgeEvent::Connected { id, result });
        }));
    }

    /// Handles the outcome of a connect attempt.
    pub(crate) async fn on_connected(&mut self, id: SubscriptionId, result: Result<ConnectedDevice>) {
        if self.connecting.as_ref().map(Subscription::id) != Some(id) {
            if let Ok(device) = result {
                warn!(session_id = %device.session_id, "Closing session from a cancelled connect");
                if let Err(e) = self.manager.disconnect(&device.session_id).await {
                    warn!(error = %e, "Failed to close orphaned session");
                }
            } else {
                trace!(%id, "Dropping stale connect result");
            }
            return;
        }
        self.connecting = None;

        let device = match result {
            Ok(device) => device,
            Err(e) => {
                self.on_connection_failed(e);
                return;
            }
        };

        let signer = match self.manager.signer(&device.session_id) {
            Ok(signer) => signer,
            Err(e) => {
                if let Err(close_error) = self.manager.disconnect(&device.session_id).await {
                    warn!(error = %close_error, "Failed to close session without signer");
                }
                self.on_connection_failed(e);
                return;
            }
        };

        info!(session_id = %device.session_id, device = %device.name, "Device connected");
        let session_id = device.session_id.clone();
        self.publish(StatusEvent::ConnectedDevice(Some(device.clone())));
        self.publish(StatusEvent::SessionId(Some(session_id.clone())));
        self.publish(StatusEvent::ConnectionStatus(ConnectionStatus::Connected));
        self.publish(StatusEvent::action_state(ACTION_NONE));
        self.session = Some(Session {
            id: session_id.clone(),
            device,
            device_status: None,
            signer,
        });
        self.phase = SessionPhase::Connected;
        // Stays armed until the device first reports CONNECTED.
        self.governor.arm(DeviceStatus::NotConnected);

        let stream = self.manager.session_state(&session_id);
        self.session_state = Some(Subscription::forward(
            "session-state",
            stream,
            self.events.clone(),
            |id, item| BridgeEvent::SessionState { id, item },
        ));
    }

    fn on_connection_failed(&mut self, e: Error) {
        error!(error = %e, "Device connection failed");
        self.discovery = None;
        self.connecting = None;
        self.phase = SessionPhase::Idle;

        self.publish(StatusEvent::error(e.to_string()));
        self.publish(StatusEvent::ConnectionStatus(ConnectionStatus::Error));
        self.publish(StatusEvent::DeviceStatus(Some(DeviceStatus::NotConnected)));
        self.publish(StatusEvent::action_state(ACTION_NONE));
        self.governor.arm(DeviceStatus::NotConnected);

        self.fail_queued_work(&e);
    }
}

// ============================================================================
// SessionContext - Device Status
// ============================================================================

impl SessionContext {
    /// Handles one item of the session state stream.
    ///
    /// The session is dropped when the stream ends, or when it fails while
    /// requests still wait for the first `CONNECTED`.
    pub(crate) async fn on_session_state(
        &mut self,
        id: SubscriptionId,
        item: Option<Result<DeviceSessionState>>,
    ) {
        if self.session_state.as_ref().map(Subscription::id) != Some(id) {
            trace!(%id, "Dropping stale session state event");
            return;
        }

        let state = match item {
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                let awaiting_status = self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.device_status.is_none());
                if awaiting_status || self.has_queued_work() {
                    self.on_session_lost(e).await;
                } else {
                    warn!(error = %e, "Device status error");
                    self.publish(StatusEvent::error(e.to_string()));
                }
                return;
            }
            None => {
                self.on_session_lost(Error::transport("Device session state stream ended"))
                    .await;
                return;
            }
        };

        let status = state.device_status;
        if let Some(session) = self.session.as_mut() {
            if session.device_status == Some(status) {
                return;
            }
            session.device_status = Some(status);
        }
        debug!(%status, app = ?state.current_app, "Device status changed");
        self.publish(StatusEvent::DeviceStatus(Some(status)));

        match status {
            DeviceStatus::Connected => {
                self.phase = SessionPhase::Connected;
                self.governor.disarm();
                if self.has_queued_work() {
                    self.run_queued_work();
                }
            }
            DeviceStatus::Locked => {
                self.phase = SessionPhase::Locked;
                self.governor.arm(status);
                if self.has_queued_work() {
                    self.publish(StatusEvent::action_state(ACTION_WAIT_FOR_UNLOCK));
                }
            }
            DeviceStatus::NotConnected => self.governor.arm(status),
        }
    }

    /// Drops a session whose status can no longer be observed.
    ///
    /// Queued requests fail with a transport error, a running operation is
    /// aborted and the auto-close countdown restarts.
    async fn on_session_lost(&mut self, e: Error) {
        let e = if e.is_transport_error() {
            e
        } else {
            Error::transport(e.to_string())
        };
        warn!(error = %e, "Device session lost");

        self.session_state = None;
        if let Some(session) = self.session.take()
            && let Err(close_error) = self.manager.disconnect(&session.id).await
        {
            warn!(session_id = %session.id, error = %close_error, "Failed to close lost session");
        }
        self.publish(StatusEvent::ConnectedDevice(None));
        self.publish(StatusEvent::SessionId(None));

        self.on_connection_failed(e);
        self.abort_operation("Device disconnected");
    }
}

// ============================================================================
// SessionContext - Disconnect
// ============================================================================

impl SessionContext {
    /// Closes the session and resets all session state. Idempotent.
    ///
    /// Queued and in-flight requests receive aborted replies.
    pub(crate) async fn disconnect(&mut self) {
        self.governor.disarm();
        self.discovery = None;
        self.connecting = None;
        self.session_state = None;

        self.abort_outstanding("Device disconnected");

        if let Some(session) = self.session.take() {
            self.phase = SessionPhase::Disconnecting;
            if let Err(e) = self.manager.disconnect(&session.id).await {
                warn!(session_id = %session.id, error = %e, "Failed to close session");
            }
            info!(session_id = %session.id, "Device disconnected");
        }
        self.phase = SessionPhase::Idle;

        self.publish(StatusEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        self.publish(StatusEvent::ConnectedDevice(None));
        self.publish(StatusEvent::SessionId(None));
        self.publish(StatusEvent::action_state(ACTION_NONE));
        self.publish(StatusEvent::DeviceStatus(None));
        self.publish(StatusEvent::Error(None));
    }

    /// Answers every waiting or running request with an aborted reply.
    pub(crate) fn abort_outstanding(&mut self, reason: &str) {
        let aborted = Error::aborted(reason);
        for waiter in std::mem::take(&mut self.waiters) {
            let reply = waiter.failure(&aborted);
            self.reply(waiter, reply);
        }
        self.abort_operation(reason);
    }

    /// Switches transport, disconnecting first when it changes.
    pub(crate) async fn update_transport(&mut self, transport: TransportType) {
        if transport == self.transport {
            trace!(%transport, "Transport unchanged");
            return;
        }
        self.disconnect().await;
        debug!(from = %self.transport, to = %transport, "Transport changed");
        self.transport = transport;
        self.publish(StatusEvent::TransportType(transport));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::bridge::BridgeOptions;
    use crate::status::{Countdown, StatusEvent};
    use crate::testing::{DiscoveryScript, Harness};
    use crate::transport::{DeviceStatus, TransportType};

    #[tokio::test]
    async fn test_make_app_replies_once_connected() {
        let mut harness = Harness::new().await;
        harness.post("ledger-make-app", json!({}), json!(1));

        let reply = harness.next_reply().await;
        assert_eq!(reply["action"], "ledger-make-app-reply");
        assert_eq!(reply["success"], true);
        assert_eq!(reply["messageId"], 1);
        assert_eq!(harness.manager.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_make_app_waits_while_locked() {
        let mut harness = Harness::builder()
            .initial_status(Some(DeviceStatus::Locked))
            .spawn()
            .await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.wait_for_status(|e| {
            *e == StatusEvent::ActionState("Wait for Unlock".into())
        })
        .await;
        assert!(harness.try_reply().is_none());

        harness.manager.push_status(DeviceStatus::Connected);
        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], true);
    }

    #[tokio::test]
    async fn test_open_locked_session_runs_work_immediately() {
        let mut harness = Harness::new().await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.next_reply().await;

        harness.manager.push_status(DeviceStatus::Locked);
        harness
            .wait_for_status(|e| *e == StatusEvent::DeviceStatus(Some(DeviceStatus::Locked)))
            .await;
        harness.post("ledger-make-app", json!({}), json!(2));
        harness.post(
            "ledger-unlock",
            json!({ "hdPath": "m/44'/60'/0'/0/0" }),
            json!(3),
        );

        let reply = harness.next_reply().await;
        assert_eq!(reply["messageId"], 2);
        assert_eq!(reply["success"], true);
        harness.wait_for_signer_calls(1).await;
        assert_eq!(harness.manager.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_status_stream_end_fails_queued_request() {
        let mut harness = Harness::builder().initial_status(None).spawn().await;
        harness.post(
            "ledger-unlock",
            json!({ "hdPath": "m/44'/60'/0'/0/0" }),
            json!(1),
        );
        harness
            .wait_for_status(|e| matches!(e, StatusEvent::SessionId(Some(_))))
            .await;

        harness.manager.end_status();

        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], false);
        assert_eq!(
            reply["payload"]["error"],
            "Transport error: Device session state stream ended"
        );
        assert!(reply.get("aborted").is_none());
        assert_eq!(harness.manager.disconnects().len(), 1);
        assert!(harness.manager.signer().calls().is_empty());
        harness
            .wait_for_status(|e| *e == StatusEvent::DeviceStatus(Some(DeviceStatus::NotConnected)))
            .await;
    }

    #[tokio::test]
    async fn test_status_error_before_first_status_fails_queued_request() {
        let mut harness = Harness::builder().initial_status(None).spawn().await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness
            .wait_for_status(|e| matches!(e, StatusEvent::SessionId(Some(_))))
            .await;

        harness.manager.fail_status("status channel broken");

        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], false);
        assert_eq!(
            reply["payload"]["error"],
            "Transport error: status channel broken"
        );
        assert_eq!(harness.manager.disconnects().len(), 1);

        // The next request opens a fresh session.
        harness.post("ledger-make-app", json!({}), json!(2));
        harness
            .wait_for_status(|e| matches!(e, StatusEvent::SessionId(Some(_))))
            .await;
        assert_eq!(harness.manager.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_status_error_on_ready_session_keeps_it() {
        let mut harness = Harness::new().await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.next_reply().await;

        harness.manager.fail_status("transient");
        harness
            .wait_for_status(|e| *e == StatusEvent::error("Transport error: transient"))
            .await;

        assert!(harness.manager.disconnects().is_empty());
        harness.post("ledger-make-app", json!({}), json!(2));
        assert_eq!(harness.next_reply().await["success"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_status_is_reclaimed_by_auto_close() {
        let mut harness = Harness::builder()
            .initial_status(None)
            .options(BridgeOptions::new().with_auto_close_timeout(Duration::from_secs(5)))
            .spawn()
            .await;
        harness.post(
            "ledger-unlock",
            json!({ "hdPath": "m/44'/60'/0'/0/0" }),
            json!(1),
        );

        harness.bridge.closed().await;

        let reply = harness.next_reply().await;
        assert_eq!(reply["messageId"], 1);
        assert_eq!(reply["aborted"], true);
        assert_eq!(
            reply["payload"]["error"],
            "Operation aborted: Auto-close timeout"
        );
        let notice = harness.next_reply().await;
        assert_eq!(notice["action"], "ledger-bridge-auto-close");
        assert_eq!(notice["reason"], "Device NOT_CONNECTED timeout");
        assert_eq!(harness.manager.connect_count(), 1);
        assert!(harness.manager.signer().calls().is_empty());
        assert_eq!(harness.host.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_until_first_connected() {
        let mut harness = Harness::builder()
            .initial_status(None)
            .options(BridgeOptions::new())
            .spawn()
            .await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.settle(Duration::from_millis(10)).await;

        let events = harness.drain_status();
        assert!(events.iter().any(|e| matches!(e, StatusEvent::SessionId(Some(_)))));
        assert!(!events.contains(&StatusEvent::TimeLeft(Countdown::Inactive)));

        harness.manager.push_status(DeviceStatus::Connected);
        assert_eq!(harness.next_reply().await["success"], true);
        assert!(
            harness
                .drain_status()
                .contains(&StatusEvent::TimeLeft(Countdown::Inactive))
        );
    }

    #[tokio::test]
    async fn test_discovery_error_fails_queued_requests() {
        let mut harness = Harness::builder()
            .discovery(DiscoveryScript::Error("no permission".into()))
            .spawn()
            .await;
        harness.post("ledger-make-app", json!({}), json!(1));

        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], false);
        assert_eq!(
            reply["payload"]["error"],
            "Transport error: no permission"
        );
        harness
            .wait_for_status(|e| *e == StatusEvent::DeviceStatus(Some(DeviceStatus::NotConnected)))
            .await;
    }

    #[tokio::test]
    async fn test_empty_discovery_fails_queued_requests() {
        let mut harness = Harness::builder()
            .discovery(DiscoveryScript::Empty)
            .spawn()
            .await;
        harness.post(
            "ledger-unlock",
            json!({ "hdPath": "m/44'/60'/0'/0/0" }),
            json!(2),
        );

        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["payload"]["error"], "Transport error: No device discovered");
        assert!(reply.get("aborted").is_none());
    }

    #[tokio::test]
    async fn test_connect_error_fails_queued_requests() {
        let mut harness = Harness::builder().connect_error("OpenFailed").spawn().await;
        harness.post("ledger-make-app", json!({}), json!(1));

        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["payload"]["errorKind"], "LEDGER_LOCKED");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut harness = Harness::new().await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.next_reply().await;

        harness.post("ledger-bridge-close", json!({}), json!(2));
        harness.post("ledger-close-bridge", json!({}), json!(3));

        let first = harness.next_reply().await;
        let second = harness.next_reply().await;
        assert_eq!(first["action"], "ledger-bridge-close-reply");
        assert_eq!(first["success"], true);
        assert_eq!(second["action"], "ledger-close-bridge-reply");
        assert_eq!(second["success"], true);
        assert_eq!(harness.manager.disconnects().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_change_disconnects_first() {
        let mut harness = Harness::new().await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.next_reply().await;
        harness.drain_status();

        harness.post(
            "ledger-update-transport",
            json!({ "transportType": "ble" }),
            json!(2),
        );
        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], true);

        let events = harness.drain_status();
        let disconnected = events
            .iter()
            .position(|e| *e == StatusEvent::SessionId(None))
            .expect("disconnect events");
        let swapped = events
            .iter()
            .position(|e| *e == StatusEvent::TransportType(TransportType::WebBle))
            .expect("transport event");
        assert!(disconnected < swapped);
        assert_eq!(harness.manager.disconnects().len(), 1);
    }

    #[tokio::test]
    async fn test_same_transport_keeps_session() {
        let mut harness = Harness::new().await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.next_reply().await;

        harness.post(
            "ledger-update-transport",
            json!({ "transportType": "webhid" }),
            json!(2),
        );
        assert_eq!(harness.next_reply().await["success"], true);
        assert!(harness.manager.disconnects().is_empty());
    }

    #[tokio::test]
    async fn test_new_transport_used_for_next_discovery() {
        let mut harness = Harness::new().await;
        harness.post(
            "ledger-update-transport",
            json!({ "transportType": "ledgerLive" }),
            json!(1),
        );
        harness.next_reply().await;

        harness.post("ledger-make-app", json!({}), json!(2));
        harness.next_reply().await;
        assert_eq!(
            harness.manager.discovered_transports(),
            vec![TransportType::LedgerLive]
        );
    }

    #[tokio::test]
    async fn test_pending_discovery_is_not_restarted() {
        let mut harness = Harness::builder()
            .discovery(DiscoveryScript::Pending)
            .spawn()
            .await;
        harness.post("ledger-make-app", json!({}), json!(1));
        harness.post("ledger-make-app", json!({}), json!(2));
        harness.settle(Duration::from_millis(50)).await;

        assert_eq!(harness.manager.discovered_transports().len(), 1);
        assert!(harness.try_reply().is_none());
    }
}
