//! Canonical CBOR encoding for bound values and SHA-256 checksums for commit records.

use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::value::Value as CborValue;
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix for rendered checksums.
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Serialize a value into canonical CBOR bytes (map keys sorted, self-described).
pub fn to_canonical_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_cbor::Error> {
    let canonical_value: CborValue = serde_cbor::value::to_value(value)?;
    let mut buf = Vec::with_capacity(64);
    let mut serializer = serde_cbor::ser::Serializer::new(&mut buf);
    serializer.self_describe()?;
    canonical_value.serialize(&mut serializer)?;
    Ok(buf)
}

pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}

/// True when `value` has no representation other than CBOR `null`
/// (`()`, `None`, unit structs).
pub fn encodes_to_null<T: Serialize + ?Sized>(value: &T) -> Result<bool, serde_cbor::Error> {
    Ok(matches!(serde_cbor::value::to_value(value)?, CborValue::Null))
}

/// SHA-256 digest over a commit record's write set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&digest);
        Checksum(arr)
    }

    pub fn of_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_cbor::Error> {
        Ok(Self::of_bytes(&to_canonical_cbor(value)?))
    }

    pub fn to_hex(&self) -> String {
        format!("{CHECKSUM_PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Checksum").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
