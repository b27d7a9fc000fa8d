//! Device transport capability.
//!
//! The transport stack (HID/BLE discovery, APDU framing, signature
//! computation) lives outside this crate. The bridge consumes it through
//! two traits:
//!
//! ```text
//! ┌─────────────────┐   start_discovering / connect    ┌─────────────────┐
//! │  Bridge loop    │ ───────────────────────────────► │  DeviceManager  │
//! │                 │ ◄─────── session_state ───────── │                 │
//! │                 │                                  └────────┬────────┘
//! │                 │   get_address / sign_*                    │ signer()
//! │                 │ ───────────────────────────────► ┌────────▼────────┐
//! │                 │ ◄────── DeviceActionState ────── │  Signer         │
//! └─────────────────┘                                  └─────────────────┘
//! ```
//!
//! Every stream is drained by a [`Subscription`] that can be cancelled at
//! any time.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Device-action states and device errors |
//! | `capability` | [`DeviceManager`] and [`Signer`] traits |
//! | `device` | Descriptors, status and transport kinds |
//! | `subscription` | Cancellable stream forwarding |

// ============================================================================
// Submodules
// ============================================================================

/// Device-action state stream types.
pub mod action;

/// Capability traits implemented by the device stack.
pub mod capability;

/// Device descriptors and status values.
pub mod device;

/// Cancellable stream forwarding.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{DeviceAction, DeviceActionState, DeviceError};
pub use capability::{AddressOptions, DeviceManager, Signer, TransactionOptions};
pub use device::{
    ConnectedDevice, DeviceSessionState, DeviceStatus, DiscoveredDevice, TransportType,
};
pub use subscription::Subscription;
