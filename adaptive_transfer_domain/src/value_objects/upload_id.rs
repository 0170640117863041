// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Identifier Value Object
//!
//! Type-safe identifier for uploads. Wrapping the raw UUID prevents an upload
//! id from being confused with any other string-typed identifier (owner,
//! storage key, task id) at compile time.
//!
//! ## Properties
//!
//! - **Immutability**: once created the identifier never changes
//! - **Equality**: two identifiers are equal iff their UUIDs are equal
//! - **Serialization**: serializes as the plain hyphenated UUID string

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransferError;

/// Globally unique upload identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from its string form.
    pub fn parse(s: &str) -> Result<Self, TransferError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TransferError::validation(format!("invalid upload id '{}': {}", s, e)))
    }

    /// Returns the wrapped UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UploadId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(UploadId::new(), UploadId::new());
    }

    #[test]
    fn test_parse_round_trip() {
        let id = UploadId::new();
        let parsed = UploadId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = UploadId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = UploadId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
