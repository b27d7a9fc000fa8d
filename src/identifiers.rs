//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers keep correlation tokens, device sessions and internal
//! subscriptions from being mixed up at compile time.
//!
//! | Type | Origin | Description |
//! |------|--------|-------------|
//! | [`MessageId`] | Host | Opaque correlation token echoed in replies |
//! | [`SessionId`] | Transport | Opaque device session handle |
//! | [`SubscriptionId`] | Bridge | Tags events from a spawned subscription |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// MessageId
// ============================================================================

/// Correlation token supplied by the host with every request.
///
/// The bridge never interprets it. Hosts send strings or numbers, so the raw
/// JSON value is kept and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Value);

impl MessageId {
    /// Wraps a raw JSON value.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    /// Returns the raw JSON value.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Device session handle assigned by the transport on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session ID from the transport's handle.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the handle as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Global counter for subscription IDs.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one spawned subscription.
///
/// Every event forwarded into the bridge loop carries the ID of the
/// subscription that produced it. Events whose ID no longer matches the
/// live subscription are stale and get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next subscription ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_message_id_echoes_raw_value() {
        let id: MessageId = serde_json::from_value(json!("abc")).expect("parse");
        assert_eq!(serde_json::to_value(&id).expect("serialize"), json!("abc"));

        let numeric: MessageId = serde_json::from_value(json!(42)).expect("parse");
        assert_eq!(numeric.as_value(), &json!(42));
    }

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId::new("abc").to_string(), "abc");
        assert_eq!(MessageId::new(7).to_string(), "7");
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new("session-1");
        assert_eq!(id.to_string(), "session-1");
        assert_eq!(id.as_str(), "session-1");
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
