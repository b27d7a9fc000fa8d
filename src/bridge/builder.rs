//! Builder pattern for bridge configuration.
//!
//! # Example
//!
//! ```ignore
//! use ledger_bridge::{Bridge, BridgeOptions, StatusStore};
//!
//! let store = StatusStore::new();
//! let bridge = Bridge::builder()
//!     .device_manager(manager)
//!     .status_sink(store.clone())
//!     .options(BridgeOptions::new())
//!     .spawn()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::{DetachedHost, FrameHost};
use crate::error::{Error, Result};
use crate::status::{StatusSink, TracingSink};
use crate::transport::DeviceManager;

use super::context::SessionContext;
use super::core::Bridge;
use super::options::BridgeOptions;

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Collects the bridge's collaborators before starting it.
#[derive(Default)]
pub struct BridgeBuilder {
    manager: Option<Arc<dyn DeviceManager>>,
    status: Option<Arc<dyn StatusSink>>,
    host: Option<Arc<dyn FrameHost>>,
    options: BridgeOptions,
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("has_device_manager", &self.manager.is_some())
            .field("has_status_sink", &self.status.is_some())
            .field("has_frame_host", &self.host.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the device stack. Required.
    #[inline]
    #[must_use]
    pub fn device_manager(mut self, manager: impl DeviceManager + 'static) -> Self {
        self.manager = Some(Arc::new(manager));
        self
    }

    /// Sets an already shared device stack. Required unless
    /// [`device_manager`](Self::device_manager) is used.
    #[inline]
    #[must_use]
    pub fn shared_device_manager(mut self, manager: Arc<dyn DeviceManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Sets the status sink. Defaults to [`TracingSink`].
    #[inline]
    #[must_use]
    pub fn status_sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.status = Some(Arc::new(sink));
        self
    }

    /// Sets the hosting frame. Defaults to a host that only logs.
    #[inline]
    #[must_use]
    pub fn frame_host(mut self, host: impl FrameHost + 'static) -> Self {
        self.host = Some(Arc::new(host));
        self
    }

    /// Sets an already shared hosting frame.
    #[inline]
    #[must_use]
    pub fn shared_frame_host(mut self, host: Arc<dyn FrameHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the configuration and starts the event loop.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no device manager was set or the options
    /// are invalid.
    pub fn spawn(self) -> Result<Bridge> {
        let manager = self.validate_manager()?;
        self.options.validate()?;

        let status = self.status.unwrap_or_else(|| Arc::new(TracingSink));
        let host = self.host.unwrap_or_else(|| Arc::new(DetachedHost));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let context = SessionContext::new(self.options, manager, status, host, events_tx);

        Ok(Bridge::start(context, events_rx))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BridgeBuilder {
    fn validate_manager(&self) -> Result<Arc<dyn DeviceManager>> {
        self.manager.clone().ok_or_else(|| {
            Error::config(
                "Device manager is required. Use .device_manager() to set it.\n\
                 Example: Bridge::builder().device_manager(manager)",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
