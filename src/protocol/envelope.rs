//! Request, reply and notice envelopes.
//!
//! Every inbound request produces exactly one [`Reply`]. Notices are
//! unsolicited and sent to the last known sender.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

use super::Action;

// ============================================================================
// Constants
// ============================================================================

/// Notice sent when the host unloads the bridge.
pub const CLOSE_NOTICE: &str = "ledger-bridge-close";

/// Notice sent when the auto-close countdown expires.
pub const AUTO_CLOSE_NOTICE: &str = "ledger-bridge-auto-close";

// ============================================================================
// RequestEnvelope
// ============================================================================

/// Raw inbound shape before the action is parsed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    target: String,
    action: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    message_id: Option<MessageId>,
}

/// A validated inbound request.
///
/// # Format
///
/// ```json
/// {
///   "target": "LEDGER-IFRAME",
///   "action": "ledger-unlock",
///   "params": { "hdPath": "m/44'/60'/0'/0/0" },
///   "messageId": 7
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Parsed action.
    pub action: Action,
    /// Action parameters; `Null` when absent.
    pub params: Value,
    /// Correlation token echoed in the reply.
    pub message_id: Option<MessageId>,
}

impl RequestEnvelope {
    /// Returns `true` if the payload carries the expected channel tag.
    ///
    /// Events failing this check belong to someone else and are ignored.
    #[must_use]
    pub fn is_addressed_to(data: &Value, target: &str) -> bool {
        data.get("target").and_then(Value::as_str) == Some(target)
    }

    /// Parses and validates an inbound payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the tag does not match or the payload
    /// has no action.
    pub fn parse(data: &Value, target: &str) -> Result<Self> {
        let raw = RawEnvelope::deserialize(data)
            .map_err(|e| Error::protocol(format!("malformed envelope: {e}")))?;
        if raw.target != target {
            return Err(Error::protocol(format!(
                "unexpected target: {}",
                raw.target
            )));
        }

        Ok(Self {
            action: Action::parse(&raw.action),
            params: raw.params,
            message_id: raw.message_id,
        })
    }

    /// Returns the reply action name.
    #[inline]
    #[must_use]
    pub fn reply_action(&self) -> String {
        self.action.reply_action()
    }
}

// ============================================================================
// Reply
// ============================================================================

/// Reply to a single request.
///
/// # Format
///
/// ```json
/// {
///   "action": "ledger-unlock-reply",
///   "success": false,
///   "payload": { "error": "..." },
///   "messageId": 7,
///   "aborted": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// `<action>-reply`.
    pub action: String,

    /// Outcome.
    pub success: bool,

    /// Result or `{ error, errorKind? }`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Echo of the request's correlation token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    /// Top-level error string, used only for unsupported actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when the request was superseded or its session went away.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
}

impl Reply {
    /// Creates a success reply.
    #[must_use]
    pub fn success(
        action: impl Into<String>,
        message_id: Option<MessageId>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            action: action.into(),
            success: true,
            payload,
            message_id,
            error: None,
            aborted: false,
        }
    }

    /// Creates a failure reply from an error.
    ///
    /// Aborted errors set the `aborted` flag.
    #[must_use]
    pub fn failure(action: impl Into<String>, message_id: Option<MessageId>, error: &Error) -> Self {
        Self {
            action: action.into(),
            success: false,
            payload: Some(error.to_payload()),
            message_id,
            error: None,
            aborted: error.is_aborted(),
        }
    }

    /// Creates the reply for an action the router does not know.
    #[must_use]
    pub fn unsupported(action: &Action, message_id: Option<MessageId>) -> Self {
        Self {
            action: action.reply_action(),
            success: false,
            payload: None,
            message_id,
            error: Some(Error::unsupported_action(action.as_str()).to_string()),
            aborted: false,
        }
    }
}

// ============================================================================
// Notice
// ============================================================================

/// Unsolicited message about the bridge's own lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// [`CLOSE_NOTICE`] or [`AUTO_CLOSE_NOTICE`].
    pub action: &'static str,

    /// Always `true`.
    pub success: bool,

    /// Human-readable cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Notice {
    /// Bridge is closing because the host unloaded it.
    #[inline]
    #[must_use]
    pub fn close() -> Self {
        Self {
            action: CLOSE_NOTICE,
            success: true,
            reason: None,
        }
    }

    /// Bridge is closing because the device stayed in `status` too long.
    #[inline]
    #[must_use]
    pub fn auto_close(status: &str) -> Self {
        Self {
            action: AUTO_CLOSE_NOTICE,
            success: true,
            reason: Some(format!("Device {status} timeout")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    const TARGET: &str = "LEDGER-IFRAME";

    #[test]
    fn test_parse_envelope() {
        let data = json!({
            "target": TARGET,
            "action": "ledger-unlock",
            "params": { "hdPath": "m/44'/60'/0'/0/0" },
            "messageId": 7
        });
        let envelope = RequestEnvelope::parse(&data, TARGET).expect("parse");
        assert_eq!(envelope.action, Action::Unlock);
        assert_eq!(envelope.message_id, Some(MessageId::new(7)));
        assert_eq!(envelope.reply_action(), "ledger-unlock-reply");
    }

    #[test]
    fn test_parse_without_params() {
        let data = json!({ "target": TARGET, "action": "heartbeat" });
        let envelope = RequestEnvelope::parse(&data, TARGET).expect("parse");
        assert_eq!(envelope.params, Value::Null);
        assert_eq!(envelope.message_id, None);
    }

    #[test]
    fn test_foreign_target_is_rejected() {
        let data = json!({ "target": "OTHER", "action": "heartbeat" });
        assert!(!RequestEnvelope::is_addressed_to(&data, TARGET));
        assert!(RequestEnvelope::parse(&data, TARGET).is_err());
        assert!(!RequestEnvelope::is_addressed_to(&json!("ping"), TARGET));
    }

    #[test]
    fn test_missing_action_is_protocol_error() {
        let data = json!({ "target": TARGET });
        assert!(RequestEnvelope::is_addressed_to(&data, TARGET));
        let err = RequestEnvelope::parse(&data, TARGET).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_success_reply_shape() {
        let reply = Reply::success(
            "heartbeat-reply",
            Some(MessageId::new("a")),
            Some(json!({ "online": true })),
        );
        assert_eq!(
            serde_json::to_value(&reply).expect("serialize"),
            json!({
                "action": "heartbeat-reply",
                "success": true,
                "payload": { "online": true },
                "messageId": "a"
            })
        );
    }

    #[test]
    fn test_aborted_failure_reply() {
        let reply = Reply::failure(
            "ledger-unlock-reply",
            Some(MessageId::new(1)),
            &Error::aborted("superseded"),
        );
        let value = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["aborted"], json!(true));
        assert_eq!(value["payload"]["error"], json!("Operation aborted: superseded"));
    }

    #[test]
    fn test_unsupported_reply_shape() {
        let reply = Reply::unsupported(&Action::parse("foo"), Some(MessageId::new(3)));
        assert_eq!(
            serde_json::to_value(&reply).expect("serialize"),
            json!({
                "action": "foo-reply",
                "success": false,
                "messageId": 3,
                "error": "Unsupported action: foo"
            })
        );
    }

    #[test]
    fn test_notices() {
        assert_eq!(
            serde_json::to_value(Notice::close()).expect("serialize"),
            json!({ "action": "ledger-bridge-close", "success": true })
        );
        assert_eq!(
            serde_json::to_value(Notice::auto_close("NOT_CONNECTED")).expect("serialize"),
            json!({
                "action": "ledger-bridge-auto-close",
                "success": true,
                "reason": "Device NOT_CONNECTED timeout"
            })
        );
    }
}
