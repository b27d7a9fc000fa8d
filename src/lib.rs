//! Ledger Bridge - Message bridge between a wallet extension and a hardware
//! signing device.
//!
//! The bridge runs inside an embedded frame. The hosting extension posts
//! request envelopes to it; the bridge drives a device session (discovery,
//! connect, lock tracking, signing) and answers each request with exactly
//! one reply envelope.
//!
//! # Architecture
//!
//! The bridge is a single event loop that owns all state:
//!
//! - **Inputs**: host messages and device streams, merged into one loop
//! - **Outputs**: reply envelopes, close notices and status events
//! - **Device stack**: consumed through [`DeviceManager`] and [`Signer`]
//!
//! Key design principles:
//!
//! - One device operation at a time; a newer request supersedes the older
//! - Cancelled streams never produce replies (subscription IDs)
//! - An idle or unreachable device closes the frame after a countdown
//!
//! # Quick Start
//!
//! ```ignore
//! use ledger_bridge::{Bridge, BridgeOptions, MessageEvent, Result, StatusStore};
//!
//! async fn run(manager: impl ledger_bridge::DeviceManager + 'static) -> Result<()> {
//!     let store = StatusStore::new();
//!     let bridge = Bridge::builder()
//!         .device_manager(manager)
//!         .status_sink(store.clone())
//!         .options(BridgeOptions::new())
//!         .spawn()?;
//!
//!     let (tx, mut replies) = tokio::sync::mpsc::unbounded_channel();
//!     bridge.post_message(MessageEvent::from_sender(
//!         serde_json::json!({ "target": "LEDGER-IFRAME", "action": "heartbeat" }),
//!         tx,
//!     ))?;
//!     println!("{}", replies.recv().await.unwrap_or_default());
//!
//!     bridge.unload().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | [`Bridge`] handle, builder and options |
//! | [`channel`] | Inbound messages and the reply path |
//! | [`eip712`] | Structured-data hashing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Envelope and params wire types |
//! | [`status`] | Observable status events and store |
//! | [`transport`] | Device capability traits |

// ============================================================================
// Modules
// ============================================================================

/// Bridge handle, event loop and configuration.
///
/// Use [`Bridge::builder()`] to start a bridge.
pub mod bridge;

/// Inbound messages, reply delivery and the hosting frame.
pub mod channel;

/// EIP-712 structured-data hashing.
pub mod eip712;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing message, session and subscription IDs.
pub mod identifiers;

/// Envelope wire types.
pub mod protocol;

/// Status events published for the UI.
pub mod status;

/// Device capability traits.
///
/// Implemented outside this crate by the HID/BLE device stack.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{Bridge, BridgeBuilder, BridgeOptions};

// Channel types
pub use channel::{DetachedHost, FrameHost, MessageEvent, Recipient, RecipientHandle};

// EIP-712 types
pub use eip712::{TypedData, TypedField};

// Error types
pub use error::{DeviceErrorKind, Error, Result};

// Identifier types
pub use identifiers::{MessageId, SessionId, SubscriptionId};

// Status types
pub use status::{
    ConnectionStatus, Countdown, StatusEvent, StatusSink, StatusSnapshot, StatusStore, TracingSink,
};

// Transport types
pub use transport::{
    AddressOptions, ConnectedDevice, DeviceAction, DeviceActionState, DeviceError, DeviceManager,
    DeviceSessionState, DeviceStatus, DiscoveredDevice, Signer, TransactionOptions, TransportType,
};
