//! Message channel protocol types.
//!
//! This module defines the messages exchanged between the host (wallet
//! extension) and the bridge over the cross-context message channel.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `RequestEnvelope` | Host → Bridge | Action request |
//! | `Reply` | Bridge → Host | Correlated response, exactly one per request |
//! | `Notice` | Bridge → Host | Unsolicited close notification |
//!
//! # Action Naming
//!
//! Actions are kebab-case strings; the reply action appends `-reply`:
//!
//! - `ledger-unlock` → `ledger-unlock-reply`
//! - `heartbeat` → `heartbeat-reply`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Closed action enum |
//! | `envelope` | Request, reply and notice envelopes |
//! | `params` | Typed params and normalization helpers |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound action names.
pub mod action;

/// Request, reply and notice envelopes.
pub mod envelope;

/// Typed request parameters.
pub mod params;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::Action;
pub use envelope::{Notice, Reply, RequestEnvelope};
pub use params::{
    AddressParams, PersonalMessageParams, TransactionParams, TransportParams, TypedDataParams,
};
