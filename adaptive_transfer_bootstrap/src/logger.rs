// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Initialization
//!
//! Installs the global `tracing` subscriber for the process. The level comes
//! from (highest precedence first) `RUST_LOG`, the configured default level,
//! then `info`. Must run once, before any other component logs.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Initializes the process-wide tracing subscriber.
///
/// `default_level` is any `EnvFilter` directive (`info`,
/// `adaptive_transfer=debug`, ...); `RUST_LOG` overrides it when set.
pub fn init(default_level: &str) -> Result<(), LoggerError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(from_env) => EnvFilter::try_new(&from_env).map_err(|e| LoggerError::InvalidFilter {
            filter: from_env,
            message: e.to_string(),
        })?,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| LoggerError::InvalidFilter {
            filter: default_level.to_string(),
            message: e.to_string(),
        })?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        let err = EnvFilter::try_new("no=such=level").unwrap_err();
        // mirror of what init() reports for a broken directive
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_init_twice_reports_already_initialized() {
        // First call may or may not win depending on test ordering across
        // the binary; the second call must report AlreadyInitialized.
        let _ = init("info");
        let second = init("info");
        assert!(matches!(second, Err(LoggerError::AlreadyInitialized)));
    }
}
