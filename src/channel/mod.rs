//! Cross-context message channel.
//!
//! The bridge never holds a reference to the host. Every inbound
//! [`MessageEvent`] carries the sender's handle, and replies go back to
//! exactly that handle. Requests without a handle get their reply dropped.
//!
//! # Components
//!
//! | Type | Role |
//! |------|------|
//! | [`Recipient`] | Anything a message can be posted to |
//! | [`MessageEvent`] | Inbound payload plus its sender |
//! | [`ResponseChannel`] | Serializes and delivers replies and notices |
//! | [`FrameHost`] | Terminates the hosting frame |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

// ============================================================================
// Recipient
// ============================================================================

/// Target of a posted message, e.g. the window that sent a request.
pub trait Recipient: Send + Sync {
    /// Delivers a message. Delivery is best effort.
    fn post_message(&self, message: Value);
}

/// Shared handle to a [`Recipient`].
pub type RecipientHandle = Arc<dyn Recipient>;

impl Recipient for mpsc::UnboundedSender<Value> {
    fn post_message(&self, message: Value) {
        if self.send(message).is_err() {
            trace!("Recipient channel closed, message dropped");
        }
    }
}

// ============================================================================
// MessageEvent
// ============================================================================

/// An inbound message with its sender.
#[derive(Clone)]
pub struct MessageEvent {
    /// Posted payload.
    pub data: Value,
    /// Sender to reply to, if known.
    pub source: Option<RecipientHandle>,
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("data", &self.data)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl MessageEvent {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(data: Value, source: Option<RecipientHandle>) -> Self {
        Self { data, source }
    }

    /// Creates an event whose replies go to `sender`.
    #[inline]
    #[must_use]
    pub fn from_sender(data: Value, sender: mpsc::UnboundedSender<Value>) -> Self {
        Self::new(data, Some(Arc::new(sender)))
    }
}

// ============================================================================
// ResponseChannel
// ============================================================================

/// Outbound side of the message channel.
///
/// Tracks the last known sender so unsolicited notices have somewhere to
/// go.
#[derive(Default)]
pub struct ResponseChannel {
    last_sender: Option<RecipientHandle>,
}

impl fmt::Debug for ResponseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseChannel")
            .field("has_last_sender", &self.last_sender.is_some())
            .finish()
    }
}

impl ResponseChannel {
    /// Creates a channel with no known sender.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the sender of the latest request.
    pub fn remember(&mut self, source: Option<&RecipientHandle>) {
        if let Some(source) = source {
            self.last_sender = Some(Arc::clone(source));
        }
    }

    /// Returns the last known sender.
    #[inline]
    #[must_use]
    pub fn last_sender(&self) -> Option<&RecipientHandle> {
        self.last_sender.as_ref()
    }

    /// Sends a message to `to`, dropping it when there is no recipient.
    pub fn send<T: Serialize>(&self, message: &T, to: Option<&RecipientHandle>) {
        let Some(recipient) = to else {
            debug!("No recipient, message dropped");
            return;
        };
        match serde_json::to_value(message) {
            Ok(value) => recipient.post_message(value),
            Err(e) => warn!(error = %e, "Failed to serialize outbound message"),
        }
    }

    /// Sends a message to the last known sender.
    #[inline]
    pub fn notify<T: Serialize>(&self, message: &T) {
        self.send(message, self.last_sender.as_ref());
    }
}

// ============================================================================
// FrameHost
// ============================================================================

/// The page or frame hosting the bridge.
pub trait FrameHost: Send + Sync {
    /// Terminates the hosting frame.
    fn close(&self);
}

/// Host used when none is configured; logs the close request.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

impl FrameHost for DetachedHost {
    fn close(&self) {
        debug!("Frame close requested with no host attached");
    }
}

// ============================================================================
// Tests
// ============================================================================
