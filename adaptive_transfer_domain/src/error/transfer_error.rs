// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! Hierarchical error type for the transfer domain. Every failure the service
//! can surface is one of these variants; the presentation layer maps them to
//! HTTP status codes and the worker pool uses the retryability predicate to
//! decide between re-submission and terminal failure.
//!
//! ## Error Categories
//!
//! - **Validation** - malformed or out-of-bounds request input; never retried
//! - **Auth** - missing/invalid credential, or an ownership violation
//! - **NotFound** - no such upload or chunk
//! - **Conflict** - idempotency fingerprint mismatch or a terminal-state
//!   transition attempt
//! - **Checksum** - body or whole-file integrity mismatch
//! - **Backpressure** - admission refused, sub-coded by the refusing limiter
//! - **TransientStorage** - storage failure worth retrying within
//!   `max_retries`
//! - **PermanentStorage** - storage failure that retrying cannot fix
//! - **Range** - malformed or unsatisfiable byte range
//! - **Database** - metadata store failure
//! - **Timeout** - a bounded wait elapsed (queue put, completion wait)
//! - **Cancelled** - the waiting side went away
//! - **Internal** - unexpected failure

use thiserror::Error;

/// Which limiter refused admission.
///
/// The wire representation (`as_str`) is used both in the
/// `X-Backpressure-Reason` response header and as a metric label, so the
/// strings are part of the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackpressureReason {
    /// The bounded task queue had no free slot within the put timeout.
    QueueFull,
    /// The global inflight cap is exhausted.
    GlobalFull,
    /// The per-upload inflight cap is exhausted.
    PerUploadFull,
    /// The fair-share cap applies (global pool contended) and this upload
    /// already holds its share.
    FairShareFull,
    /// The principal exceeded its per-minute request allowance.
    RateLimited,
}

impl BackpressureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackpressureReason::QueueFull => "queue-full",
            BackpressureReason::GlobalFull => "global-full",
            BackpressureReason::PerUploadFull => "per-upload-full",
            BackpressureReason::FairShareFull => "fair-share-full",
            BackpressureReason::RateLimited => "rate-limited",
        }
    }
}

impl std::fmt::Display for BackpressureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-specific errors for the transfer service.
///
/// Each variant carries a descriptive message; `Backpressure` carries the
/// refusing limiter instead so callers can react programmatically.
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Checksum mismatch: {0}")]
    Checksum(String),

    #[error("Admission refused: {0}")]
    Backpressure(BackpressureReason),

    #[error("Transient storage error: {0}")]
    TransientStorage(String),

    #[error("Permanent storage error: {0}")]
    PermanentStorage(String),

    #[error("Unsatisfiable range: {0}")]
    Range(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Creates a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a new authorization error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a new checksum error
    pub fn checksum(msg: impl Into<String>) -> Self {
        Self::Checksum(msg.into())
    }

    /// Creates a new retryable storage error
    pub fn transient_storage(msg: impl Into<String>) -> Self {
        Self::TransientStorage(msg.into())
    }

    /// Creates a new non-retryable storage error
    pub fn permanent_storage(msg: impl Into<String>) -> Self {
        Self::PermanentStorage(msg.into())
    }

    /// Creates a new range error
    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    /// Creates a new database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Checks whether the worker pool may retry the failed operation.
    ///
    /// Only transient storage failures and timeouts qualify; everything else
    /// is terminal for the task that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::TransientStorage(_) | TransferError::Timeout(_))
    }

    /// Gets the stable error code used in API error bodies and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "validation",
            TransferError::Auth(_) => "auth",
            TransferError::NotFound(_) => "not_found",
            TransferError::Conflict(_) => "conflict",
            TransferError::Checksum(_) => "checksum",
            TransferError::Backpressure(_) => "backpressure",
            TransferError::TransientStorage(_) => "transient_storage",
            TransferError::PermanentStorage(_) => "permanent_storage",
            TransferError::Range(_) => "range",
            TransferError::Database(_) => "database",
            TransferError::Serialization(_) => "serialization",
            TransferError::Timeout(_) => "timeout",
            TransferError::Cancelled(_) => "cancelled",
            TransferError::Internal(_) => "internal",
        }
    }

    /// Gets the refusing limiter when the error is a backpressure refusal.
    pub fn backpressure_reason(&self) -> Option<BackpressureReason> {
        match self {
            TransferError::Backpressure(reason) => Some(*reason),
            _ => None,
        }
    }
}

// Filesystem failures default to the retryable class; storage adapters that
// can distinguish permanent conditions map them explicitly.
impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::TransientStorage(err.to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_partition() {
        assert!(TransferError::transient_storage("blip").is_retryable());
        assert!(TransferError::timeout("slow").is_retryable());

        assert!(!TransferError::permanent_storage("gone").is_retryable());
        assert!(!TransferError::validation("bad").is_retryable());
        assert!(!TransferError::Backpressure(BackpressureReason::GlobalFull).is_retryable());
    }

    #[test]
    fn test_backpressure_reason_wire_names() {
        assert_eq!(BackpressureReason::QueueFull.as_str(), "queue-full");
        assert_eq!(BackpressureReason::GlobalFull.as_str(), "global-full");
        assert_eq!(BackpressureReason::PerUploadFull.as_str(), "per-upload-full");
        assert_eq!(BackpressureReason::FairShareFull.as_str(), "fair-share-full");
        assert_eq!(BackpressureReason::RateLimited.as_str(), "rate-limited");
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(TransferError::validation("x").error_code(), "validation");
        assert_eq!(
            TransferError::Backpressure(BackpressureReason::QueueFull).error_code(),
            "backpressure"
        );
        assert_eq!(TransferError::internal("x").error_code(), "internal");
    }

    #[test]
    fn test_io_error_maps_to_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk hiccup");
        let err: TransferError = io.into();
        assert!(matches!(err, TransferError::TransientStorage(_)));
    }
}
