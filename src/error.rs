//! Error types for the bridge.
//!
//! Nothing crosses the message channel as a panic. Every error ends up in a
//! failure reply built by [`Error::to_payload`].
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Protocol | [`Error::Protocol`], [`Error::InvalidArgument`], [`Error::UnsupportedAction`] |
//! | Transport | [`Error::Transport`], [`Error::NoSession`] |
//! | Device | [`Error::Device`] |
//! | Cancellation | [`Error::Aborted`], [`Error::BridgeClosed`] |
//! | Typed data | [`Error::TypedData`] |
//! | External | [`Error::Json`], [`Error::Hex`] |
//!
//! # Vendor Error Kinds
//!
//! Device stacks report state problems as raw status words or free text.
//! [`DeviceErrorKind::classify`] maps the signatures it recognizes to the
//! symbolic names hosts expect. The rules are tied to specific firmware
//! versions and do not cover every variant; unmatched errors are forwarded
//! without a kind.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::transport::DeviceError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Bridge configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed envelope.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Invalid request parameters.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Action name not recognized by the router.
    #[error("Unsupported action: {action}")]
    UnsupportedAction {
        /// The unrecognized action.
        action: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Discovery or connect failed.
    #[error("Transport error: {message}")]
    Transport {
        /// Description from the transport.
        message: String,
    },

    /// Operation needs a session but none is open.
    #[error("No device session")]
    NoSession,

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Terminal error state reported by the device.
    #[error("Device error: {}", .error.message)]
    Device {
        /// The device-reported error.
        error: DeviceError,
    },

    // ========================================================================
    // Cancellation
    // ========================================================================
    /// Operation was superseded or its session went away.
    #[error("Operation aborted: {reason}")]
    Aborted {
        /// Why the operation was aborted.
        reason: String,
    },

    /// Bridge event loop is gone.
    #[error("Bridge closed")]
    BridgeClosed,

    // ========================================================================
    // Typed Data Errors
    // ========================================================================
    /// Structured data could not be hashed.
    #[error("Typed data error: {message}")]
    TypedData {
        /// Description of the encoding problem.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Hex decoding error.
    #[error("Hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unsupported action error.
    #[inline]
    pub fn unsupported_action(action: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            action: action.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Wraps a device-reported error.
    #[inline]
    pub fn device(error: DeviceError) -> Self {
        Self::Device { error }
    }

    /// Creates an aborted error.
    #[inline]
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a typed data error.
    #[inline]
    pub fn typed_data(message: impl Into<String>) -> Self {
        Self::TypedData {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::NoSession)
    }

    /// Returns `true` if the operation was cancelled rather than rejected.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. } | Self::BridgeClosed)
    }

    /// Returns `true` if the request itself was malformed.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::InvalidArgument { .. } | Self::UnsupportedAction { .. }
        )
    }
}

// ============================================================================
// Reply Payload
// ============================================================================

impl Error {
    /// Returns the symbolic vendor kind, if the error matches one.
    #[must_use]
    pub fn kind(&self) -> Option<DeviceErrorKind> {
        match self {
            Self::Device { error } => error.kind(),
            Self::Transport { message } => DeviceErrorKind::classify(message, None, None),
            _ => None,
        }
    }

    /// Builds the `payload` of a failure reply.
    ///
    /// Device errors are forwarded verbatim; everything else is sent as its
    /// display string. `errorKind` is added when classification matches.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let error = match self {
            Self::Device { error } => serde_json::to_value(error).unwrap_or(Value::Null),
            other => Value::String(other.to_string()),
        };

        let mut payload = Map::new();
        payload.insert("error".into(), error);
        if let Some(kind) = self.kind() {
            payload.insert("errorKind".into(), json!(kind));
        }
        Value::Object(payload)
    }
}

// ============================================================================
// DeviceErrorKind
// ============================================================================

/// Status word of the "wrong application open" condition.
static WRONG_APP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[^0-9a-f])6804(?:[^0-9a-f]|$)").expect("valid regex"));

/// Signatures of a locked device: `OpenFailed`, `6801`, `5515`.
static LOCKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)OpenFailed|(?:^|[^0-9a-f])(?:6801|5515)(?:[^0-9a-f]|$)").expect("valid regex")
});

/// U2F client error code for a timeout.
const U2F_TIMEOUT_CODE: &str = "5";

/// Symbolic device-state error kinds understood by hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceErrorKind {
    /// Another application is open on the device.
    #[serde(rename = "LEDGER_WRONG_APP")]
    WrongApp,
    /// The device is PIN-locked.
    #[serde(rename = "LEDGER_LOCKED")]
    Locked,
    /// The U2F tunnel timed out.
    #[serde(rename = "LEDGER_TIMEOUT")]
    Timeout,
    /// The environment has no U2F support.
    #[serde(rename = "U2F_NOT_SUPPORTED")]
    U2fNotSupported,
}

impl DeviceErrorKind {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WrongApp => "LEDGER_WRONG_APP",
            Self::Locked => "LEDGER_LOCKED",
            Self::Timeout => "LEDGER_TIMEOUT",
            Self::U2fNotSupported => "U2F_NOT_SUPPORTED",
        }
    }

    /// Classifies an error by its message, status word and class name.
    #[must_use]
    pub fn classify(message: &str, code: Option<&str>, tag: Option<&str>) -> Option<Self> {
        let is_u2f = tag.is_some_and(|t| t.to_ascii_lowercase().contains("u2f"));
        if is_u2f && code == Some(U2F_TIMEOUT_CODE) {
            return Some(Self::Timeout);
        }

        let code = code.unwrap_or_default();
        if WRONG_APP.is_match(message) || WRONG_APP.is_match(code) {
            return Some(Self::WrongApp);
        }
        if LOCKED.is_match(message) || LOCKED.is_match(code) {
            return Some(Self::Locked);
        }
        if message.contains("U2F not supported") {
            return Some(Self::U2fNotSupported);
        }
        None
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
