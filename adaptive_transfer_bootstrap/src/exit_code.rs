// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Exit Codes
//!
//! Unix `sysexits`-style exit codes for the service binary, so supervisors
//! and scripts can distinguish failure classes without parsing logs.

/// Exit codes returned by the service binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean shutdown.
    Success = 0,
    /// Unclassified runtime failure.
    Error = 1,
    /// Bad command-line usage.
    UsageError = 64,
    /// Required external service unavailable (database, storage, queue).
    Unavailable = 69,
    /// I/O failure during startup.
    IoError = 74,
    /// Configuration file missing or invalid.
    Config = 78,
    /// Terminated by SIGINT.
    Interrupted = 130,
    /// Terminated by SIGTERM.
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysexits_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::Unavailable.as_i32(), 69);
        assert_eq!(ExitCode::Config.as_i32(), 78);
        assert_eq!(ExitCode::Terminated.as_i32(), 143);
    }

    #[test]
    fn test_success_predicate() {
        assert!(ExitCode::Success.is_success());
        assert!(!ExitCode::Error.is_success());
    }
}
