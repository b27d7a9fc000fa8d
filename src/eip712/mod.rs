//! EIP-712 structured data hashing (version 4).
//!
//! Some device firmware cannot parse arbitrarily nested typed data. For
//! those, the bridge computes the domain separator and message hash itself
//! and asks the device to sign the two hashes instead.
//!
//! # Encoding Rules
//!
//! | Field type | Encoding |
//! |------------|----------|
//! | struct | `keccak(encodeData)`, zero word when the value is null |
//! | `T[]`, `T[n]` | `keccak` of the concatenated element encodings |
//! | `string`, `bytes` | `keccak` of the raw bytes |
//! | atomic | ABI word (`address`, `bool`, `uintN`, `intN`, `bytesN`) |

// ============================================================================
// Submodules
// ============================================================================

/// Atomic value encoding.
mod encode;

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use encode::{Word, dynamic_bytes, encode_atomic, keccak256};

// ============================================================================
// Constants
// ============================================================================

/// Name of the domain struct.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

// ============================================================================
// TypedField
// ============================================================================

/// One member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
    /// Member name.
    pub name: String,
    /// Member type, e.g. `address` or `Person[]`.
    #[serde(rename = "type")]
    pub kind: String,
}

// ============================================================================
// TypedData
// ============================================================================

/// An `eth_signTypedData_v4` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// Struct definitions by name.
    pub types: FxHashMap<String, Vec<TypedField>>,
    /// Type of `message`.
    pub primary_type: String,
    /// Domain values.
    #[serde(default)]
    pub domain: Value,
    /// Message values.
    #[serde(default)]
    pub message: Value,
}

impl TypedData {
    /// Parses typed data from a JSON value or a JSON-encoded string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the value is not typed data.
    pub fn from_value(value: &Value) -> Result<Self> {
        let parsed = match value {
            Value::String(text) => serde_json::from_str(text),
            other => Self::deserialize(other),
        };
        parsed.map_err(|e| Error::invalid_argument(format!("typed data: {e}")))
    }

    /// Hash of the domain struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypedData`] if the domain cannot be encoded.
    pub fn domain_separator(&self) -> Result<[u8; 32]> {
        self.hash_struct(DOMAIN_TYPE, &self.domain)
    }

    /// Hash of the primary message struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypedData`] if the message cannot be encoded.
    pub fn message_hash(&self) -> Result<[u8; 32]> {
        self.hash_struct(&self.primary_type, &self.message)
    }

    /// `keccak(encodeData(type, value))`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypedData`] on unknown types or bad values.
    pub fn hash_struct(&self, type_name: &str, value: &Value) -> Result<[u8; 32]> {
        Ok(keccak256(&self.encode_data(type_name, value)?))
    }

    /// `keccak(encodeType(type))`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypedData`] if a referenced type is undefined.
    pub fn type_hash(&self, type_name: &str) -> Result<[u8; 32]> {
        Ok(keccak256(self.encode_type(type_name)?.as_bytes()))
    }

    /// Encodes a type and its dependencies, e.g.
    /// `Mail(Person from,Person to,string contents)Person(string name,address wallet)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypedData`] if a referenced type is undefined.
    pub fn encode_type(&self, type_name: &str) -> Result<String> {
        let mut dependencies = BTreeSet::new();
        self.collect_dependencies(type_name, &mut dependencies);
        dependencies.remove(type_name);

        let mut encoded = String::new();
        for name in std::iter::once(type_name).chain(dependencies.iter().map(String::as_str)) {
            let fields = self.fields(name)?;
            encoded.push_str(name);
            encoded.push('(');
            let members: Vec<String> = fields
                .iter()
                .map(|f| format!("{} {}", f.kind, f.name))
                .collect();
            encoded.push_str(&members.join(","));
            encoded.push(')');
        }
        Ok(encoded)
    }
}

// ============================================================================
// TypedData - Internal
// ============================================================================

impl TypedData {
    fn fields(&self, type_name: &str) -> Result<&[TypedField]> {
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::typed_data(format!("No type definition specified: {type_name}")))
    }

    fn collect_dependencies(&self, type_name: &str, found: &mut BTreeSet<String>) {
        let base = base_type(type_name);
        if found.contains(base) {
            return;
        }
        let Some(fields) = self.types.get(base) else {
            return;
        };
        found.insert(base.to_string());
        for field in fields {
            self.collect_dependencies(&field.kind, found);
        }
    }

    fn encode_data(&self, type_name: &str, value: &Value) -> Result<Vec<u8>> {
        let fields = self.fields(type_name)?;
        let mut encoded = Vec::with_capacity(32 * (fields.len() + 1));
        encoded.extend_from_slice(&self.type_hash(type_name)?);
        for field in fields {
            let member = value.get(&field.name);
            encoded.extend_from_slice(&self.encode_field(&field.name, &field.kind, member)?);
        }
        Ok(encoded)
    }

    fn encode_field(&self, name: &str, kind: &str, value: Option<&Value>) -> Result<Word> {
        if self.types.contains_key(kind) {
            return match value {
                None | Some(Value::Null) => Ok([0u8; 32]),
                Some(v) => self.hash_struct(kind, v),
            };
        }

        let value = value.ok_or_else(|| {
            Error::typed_data(format!("Missing value for field {name} of type {kind}"))
        })?;

        match kind {
            "bytes" => Ok(keccak256(&dynamic_bytes(value, true)?)),
            "string" => Ok(keccak256(&dynamic_bytes(value, false)?)),
            _ if kind.ends_with(']') => {
                let element = kind
                    .rfind('[')
                    .map(|i| &kind[..i])
                    .ok_or_else(|| Error::typed_data(format!("Unsupported type: {kind}")))?;
                let items = value.as_array().ok_or_else(|| {
                    Error::typed_data(format!("Expected array for field {name} of type {kind}"))
                })?;
                let mut encoded = Vec::with_capacity(32 * items.len());
                for item in items {
                    encoded.extend_from_slice(&self.encode_field(name, element, Some(item))?);
                }
                Ok(keccak256(&encoded))
            }
            _ => encode_atomic(kind, value),
        }
    }
}

/// Leading identifier of a type, without array suffixes.
fn base_type(kind: &str) -> &str {
    let end = kind
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(kind.len());
    &kind[..end]
}

// ============================================================================
// Tests
// ============================================================================
