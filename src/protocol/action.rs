//! Inbound action names.
//!
//! The host addresses the bridge with kebab-case action strings. Legacy
//! names from older hosts map onto the same variants where the behavior is
//! shared.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Suffix appended to the inbound action to form the reply action.
pub const REPLY_SUFFIX: &str = "-reply";

// ============================================================================
// Action
// ============================================================================

/// Closed set of actions the router understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// `heartbeat`
    Heartbeat,
    /// `heartbeat-check`
    HeartbeatCheck,
    /// `ledger-is-iframe-ready` (legacy)
    IsIframeReady,
    /// `ledger-unlock`
    Unlock,
    /// `ledger-sign-transaction`
    SignTransaction,
    /// `ledger-sign-personal-message`
    SignPersonalMessage,
    /// `ledger-sign-typed-data`
    SignTypedData,
    /// `ledger-get-app-name-and-version` (legacy)
    GetAppNameAndVersion,
    /// `ledger-make-app`
    MakeApp,
    /// `ledger-update-transport`
    UpdateTransport,
    /// `ledger-bridge-close`
    BridgeClose,
    /// `ledger-close-bridge` (legacy alias of [`Action::BridgeClose`])
    CloseBridge,
    /// Anything else.
    Unknown(String),
}

impl Action {
    /// Parses an action name. Never fails; unrecognized names become
    /// [`Action::Unknown`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "heartbeat" => Self::Heartbeat,
            "heartbeat-check" => Self::HeartbeatCheck,
            "ledger-is-iframe-ready" => Self::IsIframeReady,
            "ledger-unlock" => Self::Unlock,
            "ledger-sign-transaction" => Self::SignTransaction,
            "ledger-sign-personal-message" => Self::SignPersonalMessage,
            "ledger-sign-typed-data" => Self::SignTypedData,
            "ledger-get-app-name-and-version" => Self::GetAppNameAndVersion,
            "ledger-make-app" => Self::MakeApp,
            "ledger-update-transport" => Self::UpdateTransport,
            "ledger-bridge-close" => Self::BridgeClose,
            "ledger-close-bridge" => Self::CloseBridge,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::HeartbeatCheck => "heartbeat-check",
            Self::IsIframeReady => "ledger-is-iframe-ready",
            Self::Unlock => "ledger-unlock",
            Self::SignTransaction => "ledger-sign-transaction",
            Self::SignPersonalMessage => "ledger-sign-personal-message",
            Self::SignTypedData => "ledger-sign-typed-data",
            Self::GetAppNameAndVersion => "ledger-get-app-name-and-version",
            Self::MakeApp => "ledger-make-app",
            Self::UpdateTransport => "ledger-update-transport",
            Self::BridgeClose => "ledger-bridge-close",
            Self::CloseBridge => "ledger-close-bridge",
            Self::Unknown(name) => name,
        }
    }

    /// Returns the action name used in the reply envelope.
    #[inline]
    #[must_use]
    pub fn reply_action(&self) -> String {
        format!("{}{REPLY_SUFFIX}", self.as_str())
    }

    /// Returns `true` for actions that run an operation on the device.
    #[inline]
    #[must_use]
    pub fn is_device_operation(&self) -> bool {
        matches!(
            self,
            Self::Unlock
                | Self::SignTransaction
                | Self::SignPersonalMessage
                | Self::SignTypedData
                | Self::GetAppNameAndVersion
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(Action::parse("heartbeat"), Action::Heartbeat);
        assert_eq!(Action::parse("ledger-unlock"), Action::Unlock);
        assert_eq!(Action::parse("ledger-close-bridge"), Action::CloseBridge);
        assert_eq!(Action::parse("ledger-make-app").as_str(), "ledger-make-app");
    }

    #[test]
    fn test_unknown_keeps_name() {
        let action = Action::parse("ledger-frobnicate");
        assert_eq!(action, Action::Unknown("ledger-frobnicate".into()));
        assert_eq!(action.as_str(), "ledger-frobnicate");
    }

    #[test]
    fn test_reply_action() {
        assert_eq!(
            Action::SignTypedData.reply_action(),
            "ledger-sign-typed-data-reply"
        );
        assert_eq!(Action::parse("x").reply_action(), "x-reply");
    }

    #[test]
    fn test_device_operations() {
        assert!(Action::Unlock.is_device_operation());
        assert!(Action::GetAppNameAndVersion.is_device_operation());
        assert!(!Action::MakeApp.is_device_operation());
        assert!(!Action::Heartbeat.is_device_operation());
    }
}
