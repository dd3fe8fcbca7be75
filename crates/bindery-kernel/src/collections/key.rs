//! String encodings for collection keys.
//!
//! A key's encoding becomes the tail of its binding name, so the encoding must
//! be injective over the keys actually used, and its byte-wise order is the
//! order in which collections iterate.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("cannot decode '{encoded}' as {expected}: {reason}")]
pub struct KeyError {
    pub encoded: String,
    pub expected: &'static str,
    pub reason: String,
}

impl KeyError {
    fn new(encoded: &str, expected: &'static str, reason: impl Into<String>) -> Self {
        Self {
            encoded: encoded.to_string(),
            expected,
            reason: reason.into(),
        }
    }
}

pub trait EncodeKey {
    fn encode_key(&self) -> String;
}

pub trait DecodeKey: Sized {
    fn decode_key(encoded: &str) -> Result<Self, KeyError>;
}

impl<T: EncodeKey + ?Sized> EncodeKey for &T {
    fn encode_key(&self) -> String {
        (**self).encode_key()
    }
}

impl EncodeKey for str {
    fn encode_key(&self) -> String {
        self.to_string()
    }
}

impl EncodeKey for String {
    fn encode_key(&self) -> String {
        self.clone()
    }
}

impl DecodeKey for String {
    fn decode_key(encoded: &str) -> Result<Self, KeyError> {
        Ok(encoded.to_string())
    }
}

/// Fixed-width decimal so that string order matches numeric order.
fn decode_padded(encoded: &str, width: usize, expected: &'static str) -> Result<u64, KeyError> {
    if encoded.len() != width || !encoded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::new(
            encoded,
            expected,
            format!("expected {width} ascii digits"),
        ));
    }
    encoded
        .parse::<u64>()
        .map_err(|err| KeyError::new(encoded, expected, err.to_string()))
}

impl EncodeKey for u32 {
    fn encode_key(&self) -> String {
        format!("{self:010}")
    }
}

impl DecodeKey for u32 {
    fn decode_key(encoded: &str) -> Result<Self, KeyError> {
        let value = decode_padded(encoded, 10, "u32")?;
        u32::try_from(value).map_err(|err| KeyError::new(encoded, "u32", err.to_string()))
    }
}

impl EncodeKey for u64 {
    fn encode_key(&self) -> String {
        format!("{self:020}")
    }
}

impl DecodeKey for u64 {
    fn decode_key(encoded: &str) -> Result<Self, KeyError> {
        decode_padded(encoded, 20, "u64")
    }
}

const SIGN_BIT: u64 = 1 << 63;

// Flipping the sign bit maps i64 order onto u64 order.
impl EncodeKey for i64 {
    fn encode_key(&self) -> String {
        format!("{:020}", (*self as u64) ^ SIGN_BIT)
    }
}

impl DecodeKey for i64 {
    fn decode_key(encoded: &str) -> Result<Self, KeyError> {
        Ok((decode_padded(encoded, 20, "i64")? ^ SIGN_BIT) as i64)
    }
}
