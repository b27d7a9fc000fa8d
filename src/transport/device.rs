//! Device descriptors, status values and transport kinds.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::SessionId;

// ============================================================================
// TransportType
// ============================================================================

/// Transport used to reach the device.
///
/// `WebHid` and `WebBle` are the current transports. `U2f` and `LedgerLive`
/// are accepted for hosts still speaking the older protocol revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// USB HID.
    #[default]
    #[serde(rename = "WEB-HID")]
    WebHid,
    /// Bluetooth Low Energy.
    #[serde(rename = "WEB-BLE")]
    WebBle,
    /// Legacy U2F tunnel.
    #[serde(rename = "u2f")]
    U2f,
    /// Legacy Ledger Live websocket bridge.
    #[serde(rename = "ledgerLive")]
    LedgerLive,
}

impl TransportType {
    /// Returns the canonical name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebHid => "WEB-HID",
            Self::WebBle => "WEB-BLE",
            Self::U2f => "u2f",
            Self::LedgerLive => "ledgerLive",
        }
    }

    /// Maps `ledger-update-transport` parameters to a transport.
    ///
    /// `useLedgerLive` wins over `transportType`. Unrecognized names select
    /// BLE, matching what hosts expect from the current bridge.
    #[must_use]
    pub fn from_preference(transport_type: Option<&str>, use_ledger_live: bool) -> Self {
        if use_ledger_live {
            return Self::LedgerLive;
        }
        match transport_type {
            Some("webhid") => Self::WebHid,
            Some("ledgerLive") => Self::LedgerLive,
            Some("u2f") => Self::U2f,
            _ => Self::WebBle,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DeviceStatus
// ============================================================================

/// Status reported by the device session state stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    /// Transport lost or never established.
    NotConnected,
    /// Device reachable but PIN-locked.
    Locked,
    /// Device reachable and unlocked.
    Connected,
}

impl DeviceStatus {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::Locked => "LOCKED",
            Self::Connected => "CONNECTED",
        }
    }

    /// Returns `true` for states in which the device cannot serve requests.
    #[inline]
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Locked)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DeviceSessionState
// ============================================================================

/// One item of the per-session state stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSessionState {
    /// Current device status.
    pub device_status: DeviceStatus,
    /// Name of the application open on the device, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_app: Option<String>,
}

impl DeviceSessionState {
    /// Creates a state with only a status.
    #[inline]
    #[must_use]
    pub fn new(device_status: DeviceStatus) -> Self {
        Self {
            device_status,
            current_app: None,
        }
    }
}

// ============================================================================
// DiscoveredDevice
// ============================================================================

/// A device found by discovery, not yet connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// Transport-specific device identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Device model, e.g. `nanoX`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Transport the device was found on.
    pub transport: TransportType,
}

// ============================================================================
// ConnectedDevice
// ============================================================================

/// Descriptor returned by a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedDevice {
    /// Session handle for all further calls.
    pub session_id: SessionId,
    /// Transport-specific device identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Device model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Transport the session runs on.
    pub transport: TransportType,
}

// ============================================================================
// Tests
// ============================================================================
