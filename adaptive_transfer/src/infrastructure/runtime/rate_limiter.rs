// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Per-Principal Rate Limiter
//!
//! Fixed one-minute windows per principal, checked before any other request
//! processing. Refusals surface as `Backpressure(RateLimited)` and map to
//! 429 with a `Retry-After` hint. A zero allowance disables the limiter.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use adaptive_transfer_domain::{BackpressureReason, TransferError};

struct Window {
    minute: u64,
    count: u32,
}

/// Fixed-window request counter per principal.
pub struct RateLimiter {
    per_minute: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn current_minute() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 60)
            .unwrap_or(0)
    }

    /// Counts one request for the principal at the given minute.
    fn check_at(&self, principal: &str, minute: u64) -> Result<(), TransferError> {
        if self.per_minute == 0 {
            return Ok(());
        }

        let mut windows = self.windows.lock();
        // Stale entries drop as a side effect of the rollover, keeping the
        // table proportional to principals active this minute.
        windows.retain(|_, w| w.minute == minute);

        let window = windows.entry(principal.to_string()).or_insert(Window { minute, count: 0 });
        if window.count >= self.per_minute {
            return Err(TransferError::Backpressure(BackpressureReason::RateLimited));
        }
        window.count += 1;
        Ok(())
    }

    /// Counts one request for the principal against the current window.
    pub fn check(&self, principal: &str) -> Result<(), TransferError> {
        self.check_at(principal, Self::current_minute())
    }

    /// Seconds until the current window rolls over, for `Retry-After`.
    pub fn retry_after_seconds() -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        60 - (now % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_the_limit() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            limiter.check_at("alice", 100).unwrap();
        }
        let err = limiter.check_at("alice", 100).unwrap_err();
        assert_eq!(err.backpressure_reason(), Some(BackpressureReason::RateLimited));
    }

    #[test]
    fn test_windows_are_per_principal() {
        let limiter = RateLimiter::new(1);
        limiter.check_at("alice", 100).unwrap();
        limiter.check_at("bob", 100).unwrap();
        assert!(limiter.check_at("alice", 100).is_err());
    }

    #[test]
    fn test_window_rollover_resets() {
        let limiter = RateLimiter::new(1);
        limiter.check_at("alice", 100).unwrap();
        assert!(limiter.check_at("alice", 100).is_err());
        limiter.check_at("alice", 101).unwrap();
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::new(0);
        for _ in 0..1000 {
            limiter.check_at("alice", 100).unwrap();
        }
    }
}
