//! Inbound message routing.
//!
//! Validates the envelope, captures the sender and dispatches on the
//! action. Every routed request is answered exactly once, either here or by
//! the lifecycle manager or dispatcher it is handed to.

// ============================================================================
// Imports
// ============================================================================

use serde_json::json;
use tracing::{debug, trace, warn};

use crate::channel::MessageEvent;
use crate::protocol::params::{self, TransportParams};
use crate::protocol::{Action, Reply, RequestEnvelope};

use super::context::{ReplyTarget, SessionContext};
use super::dispatcher::OperationInput;

// ============================================================================
// SessionContext - Routing
// ============================================================================

impl SessionContext {
    /// Handles one inbound message event.
    pub(crate) async fn handle_message(&mut self, event: MessageEvent) {
        if !RequestEnvelope::is_addressed_to(&event.data, &self.options.target) {
            trace!("Ignoring message for another target");
            return;
        }
        let envelope = match RequestEnvelope::parse(&event.data, &self.options.target) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed envelope");
                return;
            }
        };

        self.channel.remember(event.source.as_ref());
        let target = ReplyTarget {
            action: envelope.reply_action(),
            message_id: envelope.message_id.clone(),
            source: event.source,
        };
        debug!(
            action = %envelope.action,
            message_id = ?envelope.message_id,
            "Request received"
        );

        match envelope.action {
            Action::Heartbeat | Action::HeartbeatCheck => {
                let reply = target.success(Some(json!({ "online": true })));
                self.reply(target, reply);
            }

            Action::IsIframeReady => {
                let reply = target.success(None);
                self.reply(target, reply);
            }

            Action::MakeApp => self.make_app(target),

            Action::UpdateTransport => {
                let transport = params::parse::<TransportParams>(&envelope.params)
                    .unwrap_or_default()
                    .transport();
                self.update_transport(transport).await;
                let reply = target.success(None);
                self.reply(target, reply);
            }

            Action::BridgeClose | Action::CloseBridge => {
                self.disconnect().await;
                let reply = target.success(None);
                self.reply(target, reply);
            }

            ref action if action.is_device_operation() => {
                match OperationInput::from_request(action, &envelope.params) {
                    Ok(input) => self.submit_operation(input, target),
                    Err(e) => {
                        debug!(action = %action, error = %e, "Rejecting request");
                        let reply = target.failure(&e);
                        self.reply(target, reply);
                    }
                }
            }

            action => {
                warn!(action = %action, "Unsupported action");
                let reply = Reply::unsupported(&action, target.message_id.clone());
                self.reply(target, reply);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::channel::MessageEvent;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_heartbeat() {
        let mut harness = Harness::new().await;
        harness.post("heartbeat", json!({}), json!("hb-1"));
        harness.post("heartbeat-check", json!({}), json!("hb-2"));

        assert_eq!(
            harness.next_reply().await,
            json!({
                "action": "heartbeat-reply",
                "success": true,
                "payload": { "online": true },
                "messageId": "hb-1"
            })
        );
        assert_eq!(harness.next_reply().await["action"], "heartbeat-check-reply");
    }

    #[tokio::test]
    async fn test_iframe_ready() {
        let mut harness = Harness::new().await;
        harness.post("ledger-is-iframe-ready", json!({}), json!(5));
        assert_eq!(
            harness.next_reply().await,
            json!({
                "action": "ledger-is-iframe-ready-reply",
                "success": true,
                "messageId": 5
            })
        );
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let mut harness = Harness::new().await;
        harness.post("ledger-frobnicate", json!({}), json!(9));
        assert_eq!(
            harness.next_reply().await,
            json!({
                "action": "ledger-frobnicate-reply",
                "success": false,
                "messageId": 9,
                "error": "Unsupported action: ledger-frobnicate"
            })
        );
        assert_eq!(harness.manager.discovered_transports().len(), 0);
    }

    #[tokio::test]
    async fn test_foreign_messages_are_ignored() {
        let mut harness = Harness::new().await;
        harness.post_raw(json!({ "target": "SOMEONE-ELSE", "action": "heartbeat" }));
        harness.post_raw(json!("not an object"));
        harness.post_raw(json!({ "target": "LEDGER-IFRAME" }));
        harness.post("heartbeat", json!({}), json!(1));

        let reply = harness.next_reply().await;
        assert_eq!(reply["messageId"], 1);
        assert!(harness.try_reply().is_none());
    }

    #[tokio::test]
    async fn test_invalid_params_reply_without_device() {
        let mut harness = Harness::new().await;
        harness.post("ledger-sign-personal-message", json!({ "hdPath": "m/0" }), json!(4));

        let reply = harness.next_reply().await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["messageId"], 4);
        assert!(
            reply["payload"]["error"]
                .as_str()
                .is_some_and(|e| e.starts_with("Invalid argument"))
        );
        assert_eq!(harness.manager.discovered_transports().len(), 0);
    }

    #[tokio::test]
    async fn test_reply_without_source_is_dropped() {
        let mut harness = Harness::new().await;
        let data = json!({ "target": "LEDGER-IFRAME", "action": "heartbeat", "messageId": 1 });
        harness
            .bridge
            .post_message(MessageEvent::new(data, None))
            .expect("post");
        harness.post("heartbeat", json!({}), json!(2));

        assert_eq!(harness.next_reply().await["messageId"], 2);
        assert!(harness.try_reply().is_none());
    }
}
