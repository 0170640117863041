// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checksum Value Object
//!
//! SHA-256 digest used for chunk body integrity, whole-file verification at
//! complete time, and idempotency fingerprints. Stored and transmitted as a
//! lowercase 64-character hex string.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::TransferError;

/// A 32-byte SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Computes the digest of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parses a digest from its 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, TransferError> {
        let raw = hex::decode(s)
            .map_err(|e| TransferError::validation(format!("invalid sha256 hex '{}': {}", s, e)))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| TransferError::validation(format!("sha256 digest must be 32 bytes, got '{}'", s)))?;
        Ok(Self(bytes))
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha256Digest::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Incremental SHA-256 over a sequence of byte slices.
///
/// Used by whole-file verification, which hashes chunks in index order
/// without materializing the file.
#[derive(Default)]
pub struct RollingSha256 {
    inner: Sha256,
}

impl RollingSha256 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Sha256Digest {
        Sha256Digest(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let digest = Sha256Digest::compute(b"0123456789");
        let again = Sha256Digest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, again);
    }

    #[test]
    fn test_known_vector() {
        // sha256 of the empty string
        let digest = Sha256Digest::compute(b"");
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(Sha256Digest::from_hex("zzzz").is_err());
        assert!(Sha256Digest::from_hex("abcd").is_err()); // wrong length
    }

    #[test]
    fn test_rolling_matches_one_shot() {
        let mut rolling = RollingSha256::new();
        rolling.update(b"0123");
        rolling.update(b"4567");
        rolling.update(b"89");
        assert_eq!(rolling.finalize(), Sha256Digest::compute(b"0123456789"));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let digest = Sha256Digest::compute(b"x");
        let json = serde_json::to_string(&digest).unwrap();
        let back: Sha256Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(digest, back);
        assert!(json.starts_with('"') && json.len() == 66);
    }
}
