//! Typed request parameters and their normalization.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::eip712::TypedData;
use crate::error::{Error, Result};
use crate::transport::TransportType;

// ============================================================================
// Parameter Types
// ============================================================================

/// Params of `ledger-unlock`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressParams {
    /// Derivation path, e.g. `m/44'/60'/0'/0/0`.
    pub hd_path: String,
}

/// Params of `ledger-sign-transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    /// Derivation path.
    pub hd_path: String,
    /// Serialized transaction as hex.
    pub tx: String,
}

/// Params of `ledger-sign-personal-message`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalMessageParams {
    /// Derivation path.
    pub hd_path: String,
    /// Message bytes as hex.
    pub message: String,
}

/// Params of `ledger-sign-typed-data`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataParams {
    /// Derivation path.
    pub hd_path: String,
    /// Typed data, either as an object or a JSON string.
    pub message: Value,
}

/// Params of `ledger-update-transport`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportParams {
    /// Preference string sent by the host.
    #[serde(default)]
    pub transport_type: Option<String>,
    /// Legacy flag selecting Ledger Live.
    #[serde(default)]
    pub use_ledger_live: bool,
}

impl TypedDataParams {
    /// Parses the embedded typed data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `message` is not typed data.
    pub fn typed_data(&self) -> Result<TypedData> {
        TypedData::from_value(&self.message)
    }
}

impl TransportParams {
    /// Resolves the requested transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> TransportType {
        TransportType::from_preference(self.transport_type.as_deref(), self.use_ledger_live)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Deserializes the `params` object of a request.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if required fields are missing or
/// have the wrong type.
pub fn parse<T: DeserializeOwned>(params: &Value) -> Result<T> {
    T::deserialize(params).map_err(|e| Error::invalid_argument(e.to_string()))
}

// ============================================================================
// Normalization
// ============================================================================

/// Strips the leading `m/` from a derivation path.
#[inline]
#[must_use]
pub fn normalize_hd_path(path: &str) -> &str {
    path.strip_prefix("m/").unwrap_or(path)
}

/// Decodes a hex string, with or without `0x`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the text is not valid hex.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    hex::decode(strip_hex_prefix(text))
        .map_err(|e| Error::invalid_argument(format!("invalid hex: {e}")))
}

/// Decodes hex-encoded message bytes into text, one char per byte.
///
/// Digits are read in pairs; a trailing single digit is its own byte, so
/// `"48656c6c6f7"` decodes to `"Hello\u{7}"`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the text is not valid hex.
pub fn hex_to_ascii(text: &str) -> Result<String> {
    let digits = strip_hex_prefix(text);
    if !digits.is_ascii() {
        return Err(Error::invalid_argument("invalid hex: non-ASCII digits"));
    }

    let (pairs, tail) = digits.split_at(digits.len() - digits.len() % 2);
    let mut bytes =
        hex::decode(pairs).map_err(|e| Error::invalid_argument(format!("invalid hex: {e}")))?;
    if !tail.is_empty() {
        let last = u8::from_str_radix(tail, 16)
            .map_err(|_| Error::invalid_argument(format!("invalid hex digit: {tail}")))?;
        bytes.push(last);
    }
    Ok(bytes.into_iter().map(char::from).collect())
}

fn strip_hex_prefix(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

// ============================================================================
// Tests
// ============================================================================
