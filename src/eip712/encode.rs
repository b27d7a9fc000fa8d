//! ABI encoding of atomic EIP-712 values into 32-byte words.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// One ABI word.
pub(crate) type Word = [u8; 32];

/// Sign and big-endian magnitude of a parsed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Integer {
    negative: bool,
    magnitude: Word,
}

// ============================================================================
// Hashing
// ============================================================================

/// Keccak-256 digest.
pub(crate) fn keccak256(data: &[u8]) -> Word {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

// ============================================================================
// Atomic Encoding
// ============================================================================

/// Encodes an atomic (fixed-size) value.
pub(crate) fn encode_atomic(kind: &str, value: &Value) -> Result<Word> {
    if kind == "address" {
        return encode_unsigned(value, 160, kind);
    }
    if kind == "bool" {
        let truthy = match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
            _ => true,
        };
        let mut word = [0u8; 32];
        word[31] = u8::from(truthy);
        return Ok(word);
    }
    if let Some(size) = kind.strip_prefix("bytes") {
        let size = parse_size(size, 1, 32, kind)?;
        return encode_fixed_bytes(value, size, kind);
    }
    if let Some(bits) = kind.strip_prefix("uint") {
        let bits = if bits.is_empty() { 256 } else { parse_size(bits, 8, 256, kind)? };
        return encode_unsigned(value, bits, kind);
    }
    if let Some(bits) = kind.strip_prefix("int") {
        let bits = if bits.is_empty() { 256 } else { parse_size(bits, 8, 256, kind)? };
        return encode_signed(value, bits, kind);
    }
    Err(Error::typed_data(format!("Unsupported type: {kind}")))
}

/// Returns the raw bytes of a `bytes` or `string` value before hashing.
///
/// Hex-prefixed strings are decoded for `bytes`; numbers become their
/// minimal big-endian representation.
pub(crate) fn dynamic_bytes(value: &Value, decode_hex: bool) -> Result<Vec<u8>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_digits) if decode_hex => decode_hex_digits(hex_digits),
            _ => Ok(s.as_bytes().to_vec()),
        },
        Value::Number(_) => {
            let integer = parse_integer(value)?;
            Ok(minimal_bytes(&integer.magnitude).to_vec())
        }
        other => Ok(other.to_string().into_bytes()),
    }
}

/// Right-pads a `bytesN` value.
fn encode_fixed_bytes(value: &Value, size: usize, kind: &str) -> Result<Word> {
    let bytes = dynamic_bytes(value, true)?;
    if bytes.len() > size {
        return Err(Error::typed_data(format!(
            "Value of {kind} is {} bytes long",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(&bytes);
    Ok(word)
}

/// Encodes an unsigned integer of the given width.
fn encode_unsigned(value: &Value, bits: usize, kind: &str) -> Result<Word> {
    let integer = parse_integer(value)?;
    if integer.negative && !is_zero(&integer.magnitude) {
        return Err(Error::typed_data(format!("Negative value for {kind}")));
    }
    if bit_length(&integer.magnitude) > bits {
        return Err(Error::typed_data(format!("Value exceeds width of {kind}")));
    }
    Ok(integer.magnitude)
}

/// Encodes a signed integer of the given width in two's complement.
fn encode_signed(value: &Value, bits: usize, kind: &str) -> Result<Word> {
    let integer = parse_integer(value)?;
    let length = bit_length(&integer.magnitude);
    let fits = if integer.negative {
        length < bits || (length == bits && is_power_of_two(&integer.magnitude))
    } else {
        length < bits
    };
    if !fits {
        return Err(Error::typed_data(format!("Value exceeds width of {kind}")));
    }
    if integer.negative {
        Ok(twos_complement(integer.magnitude))
    } else {
        Ok(integer.magnitude)
    }
}

// ============================================================================
// Integer Parsing
// ============================================================================

/// Parses a JSON number, decimal string or `0x` hex string.
fn parse_integer(value: &Value) -> Result<Integer> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(from_u64(false, u));
            }
            if let Some(i) = n.as_i64() {
                return Ok(from_u64(i < 0, i.unsigned_abs()));
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 => {
                    parse_integer_str(&format!("{f:.0}"))
                }
                _ => Err(Error::typed_data(format!("Not an integer: {n}"))),
            }
        }
        Value::String(s) => parse_integer_str(s),
        other => Err(Error::typed_data(format!("Not an integer: {other}"))),
    }
}

fn parse_integer_str(text: &str) -> Result<Integer> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex_digits) => {
            let bytes = decode_hex_digits(hex_digits)?;
            let bytes = strip_leading_zeros(&bytes);
            if bytes.len() > 32 {
                return Err(Error::typed_data(format!("Integer too large: {text}")));
            }
            let mut word = [0u8; 32];
            word[32 - bytes.len()..].copy_from_slice(bytes);
            word
        }
        None => parse_decimal(digits).ok_or_else(|| {
            Error::typed_data(format!("Invalid integer: {text}"))
        })?,
    };

    Ok(Integer {
        negative,
        magnitude,
    })
}

/// Parses decimal digits into a 256-bit big-endian word.
fn parse_decimal(digits: &str) -> Option<Word> {
    if digits.is_empty() {
        return None;
    }
    let mut word = [0u8; 32];
    for c in digits.chars() {
        let digit = c.to_digit(10)?;
        let mut carry = digit;
        for byte in word.iter_mut().rev() {
            let next = u32::from(*byte) * 10 + carry;
            *byte = (next & 0xff) as u8;
            carry = next >> 8;
        }
        if carry != 0 {
            return None;
        }
    }
    Some(word)
}

fn decode_hex_digits(digits: &str) -> Result<Vec<u8>> {
    if digits.len() % 2 == 1 {
        Ok(hex::decode(format!("0{digits}"))?)
    } else {
        Ok(hex::decode(digits)?)
    }
}

// ============================================================================
// Word Helpers
// ============================================================================

fn from_u64(negative: bool, value: u64) -> Integer {
    let mut magnitude = [0u8; 32];
    magnitude[24..].copy_from_slice(&value.to_be_bytes());
    Integer {
        negative,
        magnitude,
    }
}

fn parse_size(text: &str, min: usize, max: usize, kind: &str) -> Result<usize> {
    match text.parse::<usize>() {
        Ok(size) if (min..=max).contains(&size) => Ok(size),
        _ => Err(Error::typed_data(format!("Unsupported type: {kind}"))),
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn minimal_bytes(word: &Word) -> &[u8] {
    strip_leading_zeros(word)
}

fn is_zero(word: &Word) -> bool {
    word.iter().all(|&b| b == 0)
}

fn bit_length(word: &Word) -> usize {
    match word.iter().position(|&b| b != 0) {
        Some(index) => (31 - index) * 8 + (8 - word[index].leading_zeros() as usize),
        None => 0,
    }
}

fn is_power_of_two(word: &Word) -> bool {
    word.iter().map(|b| b.count_ones()).sum::<u32>() == 1
}

fn twos_complement(mut word: Word) -> Word {
    for byte in word.iter_mut() {
        *byte = !*byte;
    }
    for byte in word.iter_mut().rev() {
        let (next, overflow) = byte.overflowing_add(1);
        *byte = next;
        if !overflow {
            break;
        }
    }
    word
}

// ============================================================================
// Tests
// ============================================================================
