//! The bridge: routing, session lifecycle, operations and auto-close.
//!
//! ```text
//!   MessageEvent ──► Router ──► Session lifecycle ──► Dispatcher ──► Reply
//!                                     │
//!                                     ▼
//!                              Auto-close governor ──► Notice + FrameHost::close
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`BridgeBuilder`] |
//! | `core` | [`Bridge`] handle and event loop |
//! | `options` | [`BridgeOptions`] |
//! | `context` | State owned by the event loop |
//! | `router` | Inbound envelope dispatch |
//! | `session` | Discovery, connect, status, disconnect |
//! | `dispatcher` | Single-flight device operations |
//! | `governor` | Auto-close countdown |

// ============================================================================
// Submodules
// ============================================================================

/// Bridge builder.
pub mod builder;

/// Bridge handle and event loop.
pub mod core;

/// Bridge configuration.
pub mod options;

mod context;
mod dispatcher;
mod governor;
mod router;
mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BridgeBuilder;
pub use core::Bridge;
pub use options::BridgeOptions;
