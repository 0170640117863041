// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Idempotency Registry Port
//!
//! Key + fingerprint deduplication with TTL for the three idempotent
//! operations (init, chunk, complete).
//!
//! ## Contract
//!
//! - `reserve` is atomic: concurrent presentations of the same `(kind, key)`
//!   see exactly one `Fresh`
//! - the same key with a matching fingerprint replays the stored result
//! - the same key with a different fingerprint is a conflict
//! - a matching key whose result is not yet stored answers `InFlight`; the
//!   caller surfaces it as a conflict rather than double-executing
//! - presentation without a key bypasses the registry entirely (caller's
//!   responsibility)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TransferError;
use crate::value_objects::Sha256Digest;

/// Which idempotent operation a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Init,
    Chunk,
    Complete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Init => "init",
            OperationKind::Chunk => "chunk",
            OperationKind::Complete => "complete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The key is new (or expired); the caller owns the operation and must
    /// store its result.
    Fresh,
    /// Same key, same fingerprint, result available: return it verbatim.
    Replay(serde_json::Value),
    /// Same key, same fingerprint, but the first presentation has not
    /// finished yet.
    InFlight,
    /// Same key, different fingerprint.
    Conflict,
}

/// Fingerprint + key deduplication with TTL.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically reserves `(kind, key)` with the given request fingerprint.
    async fn reserve(
        &self,
        kind: OperationKind,
        key: &str,
        fingerprint: &Sha256Digest,
        ttl_seconds: i64,
    ) -> Result<Reservation, TransferError>;

    /// Stores the operation result for later replays.
    async fn store_result(
        &self,
        kind: OperationKind,
        key: &str,
        result: &serde_json::Value,
    ) -> Result<(), TransferError>;

    /// Drops a reservation that never produced a result, so a later retry
    /// of the same key starts fresh instead of reading `InFlight` forever.
    async fn release(&self, kind: OperationKind, key: &str) -> Result<(), TransferError>;

    /// Deletes expired records; returns how many were removed.
    async fn gc(&self, now: DateTime<Utc>) -> Result<u64, TransferError>;
}
