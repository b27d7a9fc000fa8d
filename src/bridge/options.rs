//! Bridge configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use ledger_bridge::{BridgeOptions, TransportType};
//!
//! let options = BridgeOptions::new()
//!     .with_auto_close_timeout(Duration::from_secs(30))
//!     .with_transport(TransportType::WebBle);
//!
//! assert_eq!(options.target, "LEDGER-IFRAME");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{AddressOptions, TransportType};

// ============================================================================
// Constants
// ============================================================================

/// Channel tag inbound envelopes must carry.
pub const DEFAULT_TARGET: &str = "LEDGER-IFRAME";

/// Time an unreachable device is tolerated before the bridge closes.
pub const DEFAULT_AUTO_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Countdown publishing interval.
pub const DEFAULT_COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Origin domain passed to transaction signing.
pub const DEFAULT_TRANSACTION_DOMAIN: &str = "localhost";

// ============================================================================
// BridgeOptions
// ============================================================================

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Value of the `target` field inbound envelopes must carry.
    pub target: String,

    /// Auto-close countdown length.
    pub auto_close_timeout: Duration,

    /// Interval between countdown updates.
    pub countdown_tick: Duration,

    /// Transport used until the host asks for another one.
    pub transport: TransportType,

    /// Origin domain passed to transaction signing.
    pub transaction_domain: String,

    /// Flags for address retrieval.
    pub address: AddressOptions,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            auto_close_timeout: DEFAULT_AUTO_CLOSE_TIMEOUT,
            countdown_tick: DEFAULT_COUNTDOWN_TICK,
            transport: TransportType::default(),
            transaction_domain: DEFAULT_TRANSACTION_DOMAIN.to_string(),
            address: AddressOptions::default(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Sets the channel target tag.
    #[inline]
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the auto-close countdown length.
    #[inline]
    #[must_use]
    pub fn with_auto_close_timeout(mut self, timeout: Duration) -> Self {
        self.auto_close_timeout = timeout;
        self
    }

    /// Sets the countdown publishing interval.
    #[inline]
    #[must_use]
    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }

    /// Sets the initial transport.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the transaction signing domain.
    #[inline]
    #[must_use]
    pub fn with_transaction_domain(mut self, domain: impl Into<String>) -> Self {
        self.transaction_domain = domain.into();
        self
    }

    /// Requests on-device confirmation of retrieved addresses.
    #[inline]
    #[must_use]
    pub fn with_check_on_device(mut self, enabled: bool) -> Self {
        self.address.check_on_device = enabled;
        self
    }

    /// Requests the chain code alongside retrieved addresses.
    #[inline]
    #[must_use]
    pub fn with_return_chain_code(mut self, enabled: bool) -> Self {
        self.address.return_chain_code = enabled;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BridgeOptions {
    /// Checks the options for values the event loop cannot run with.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(Error::config("Channel target must not be empty"));
        }
        if self.countdown_tick.is_zero() {
            return Err(Error::config("Countdown tick must be non-zero"));
        }
        if self.auto_close_timeout < self.countdown_tick {
            return Err(Error::config(
                "Auto-close timeout must be at least one countdown tick",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::new();
        assert_eq!(options.target, "LEDGER-IFRAME");
        assert_eq!(options.auto_close_timeout, Duration::from_secs(60));
        assert_eq!(options.countdown_tick, Duration::from_secs(1));
        assert_eq!(options.transport, TransportType::WebHid);
        assert_eq!(options.transaction_domain, "localhost");
        assert!(!options.address.check_on_device);
        assert!(!options.address.return_chain_code);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let options = BridgeOptions::new()
            .with_target("OTHER")
            .with_transport(TransportType::WebBle)
            .with_check_on_device(true)
            .with_return_chain_code(true)
            .with_transaction_domain("wallet.example");

        assert_eq!(options.target, "OTHER");
        assert_eq!(options.transport, TransportType::WebBle);
        assert!(options.address.check_on_device);
        assert!(options.address.return_chain_code);
        assert_eq!(options.transaction_domain, "wallet.example");
    }

    #[test]
    fn test_validation() {
        assert!(BridgeOptions::new().with_target("").validate().is_err());
        assert!(
            BridgeOptions::new()
                .with_countdown_tick(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            BridgeOptions::new()
                .with_auto_close_timeout(Duration::from_millis(10))
                .validate()
                .is_err()
        );
    }
}
