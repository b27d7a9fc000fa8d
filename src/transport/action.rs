//! Device-action state stream types.
//!
//! A signer operation does not return a single value. The device may ask
//! for several confirmations, so each operation yields a stream of
//! [`DeviceActionState`] values ending in exactly one terminal state.

// ============================================================================
// Imports
// ============================================================================

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeviceErrorKind;

// ============================================================================
// Types
// ============================================================================

/// Stream returned by every signer operation.
pub type DeviceAction = BoxStream<'static, DeviceActionState>;

// ============================================================================
// DeviceActionState
// ============================================================================

/// One state of a running device action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DeviceActionState {
    /// Queued, not yet sent to the device.
    NotStarted,

    /// Waiting on the device.
    Pending {
        /// Interaction the user must perform, e.g. `unlock-device`.
        #[serde(default, rename = "requiredUserInteraction")]
        required_user_interaction: Option<String>,
    },

    /// Stopped before completion.
    Stopped,

    /// Finished successfully.
    Completed {
        /// Operation output (address, signature, app info).
        output: Value,
    },

    /// Finished with a device-reported error.
    Error {
        /// The error as reported by the device stack.
        error: DeviceError,
    },
}

impl DeviceActionState {
    /// Returns `true` for states after which no further state follows.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Completed { .. } | Self::Error { .. }
        )
    }

    /// Returns the status name.
    #[inline]
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Pending { .. } => "pending",
            Self::Stopped => "stopped",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}

// ============================================================================
// DeviceError
// ============================================================================

/// Error reported by the device stack.
///
/// Forwarded to the host verbatim inside failure replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceError {
    /// Error class name from the device stack.
    #[serde(rename = "_tag", default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Human readable message.
    pub message: String,

    /// APDU status word or transport error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl DeviceError {
    /// Creates an error with only a message.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            tag: None,
            message: message.into(),
            error_code: None,
        }
    }

    /// Sets the error class name.
    #[inline]
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the status word.
    #[inline]
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Returns `true` when the user rejected the action on the device.
    ///
    /// Recognizes `6985` (conditions of use not satisfied) and `5501`
    /// (refused on device), plus tags naming a refusal.
    #[must_use]
    pub fn is_user_cancellation(&self) -> bool {
        let by_code = self
            .error_code
            .as_deref()
            .is_some_and(|code| matches!(code.trim_start_matches("0x"), "6985" | "5501"));
        let by_tag = self.tag.as_deref().is_some_and(|tag| {
            let tag = tag.to_ascii_lowercase();
            tag.contains("refused") || tag.contains("rejected")
        });
        by_code || by_tag
    }

    /// Returns the symbolic kind when the error matches a known signature.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<DeviceErrorKind> {
        DeviceErrorKind::classify(
            &self.message,
            self.error_code.as_deref(),
            self.tag.as_deref(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
