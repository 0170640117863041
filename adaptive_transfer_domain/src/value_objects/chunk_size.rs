// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Size Value Object
//!
//! Validated chunk size used throughout the transfer system. Chunk size is
//! fixed at upload initialization and immutable afterwards; every chunk of an
//! upload has exactly this size except possibly the last one.
//!
//! ## Constraints
//!
//! - **Minimum (1 byte)**: zero-byte chunks are meaningless; tiny sizes stay
//!   legal so tests can exercise multi-chunk uploads with small payloads
//! - **Maximum (512 MB)**: bounds per-chunk memory while a chunk body is held
//!   during execution
//! - **Default (4 MB)**: the size handed to clients that do not choose one
//!
//! ## Usage
//!
//! ```
//! use adaptive_transfer_domain::value_objects::ChunkSize;
//!
//! let chunk = ChunkSize::new(4).unwrap();
//! assert_eq!(chunk.chunks_needed(10), 3); // sizes 4, 4, 2
//! assert_eq!(chunk.len_of_chunk(2, 10), 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Immutable, validated chunk size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkSize(u64);

impl ChunkSize {
    /// Minimum chunk size in bytes
    pub const MIN_BYTES: u64 = 1;

    /// Maximum chunk size in bytes (512 MB)
    pub const MAX_BYTES: u64 = 512 * 1024 * 1024;

    /// Default chunk size in bytes (4 MB)
    pub const DEFAULT_BYTES: u64 = 4 * 1024 * 1024;

    /// Creates a chunk size, validating the bounds.
    pub fn new(bytes: u64) -> Result<Self, TransferError> {
        if bytes < Self::MIN_BYTES {
            return Err(TransferError::validation(format!(
                "chunk size must be at least {} byte, got {}",
                Self::MIN_BYTES,
                bytes
            )));
        }
        if bytes > Self::MAX_BYTES {
            return Err(TransferError::validation(format!(
                "chunk size must be at most {} bytes, got {}",
                Self::MAX_BYTES,
                bytes
            )));
        }
        Ok(Self(bytes))
    }

    /// Creates a chunk size from megabytes.
    pub fn from_mb(mb: u64) -> Result<Self, TransferError> {
        Self::new(mb * 1024 * 1024)
    }

    /// Returns the size in bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Number of chunks needed to cover `file_size` bytes.
    ///
    /// Zero iff the file is empty.
    pub fn chunks_needed(&self, file_size: u64) -> u64 {
        file_size.div_ceil(self.0)
    }

    /// Expected length of the chunk at `index` for a file of `file_size`
    /// bytes. Every chunk is full-sized except the last, which carries the
    /// remainder.
    pub fn len_of_chunk(&self, index: u64, file_size: u64) -> u64 {
        let total = self.chunks_needed(file_size);
        if total == 0 || index >= total {
            return 0;
        }
        if index + 1 == total {
            let rem = file_size - index * self.0;
            debug_assert!(rem > 0 && rem <= self.0);
            rem
        } else {
            self.0
        }
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT_BYTES)
    }
}

impl std::fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(ChunkSize::new(0).is_err());
        assert!(ChunkSize::new(1).is_ok());
        assert!(ChunkSize::new(ChunkSize::MAX_BYTES).is_ok());
        assert!(ChunkSize::new(ChunkSize::MAX_BYTES + 1).is_err());
    }

    #[test]
    fn test_chunks_needed() {
        let cs = ChunkSize::new(4).unwrap();
        assert_eq!(cs.chunks_needed(0), 0);
        assert_eq!(cs.chunks_needed(1), 1);
        assert_eq!(cs.chunks_needed(4), 1);
        assert_eq!(cs.chunks_needed(5), 2);
        assert_eq!(cs.chunks_needed(10), 3);
    }

    #[test]
    fn test_len_of_chunk() {
        let cs = ChunkSize::new(4).unwrap();
        // file of 10 bytes: chunks sized 4, 4, 2
        assert_eq!(cs.len_of_chunk(0, 10), 4);
        assert_eq!(cs.len_of_chunk(1, 10), 4);
        assert_eq!(cs.len_of_chunk(2, 10), 2);
        // out of range
        assert_eq!(cs.len_of_chunk(3, 10), 0);
        // empty file has no chunks
        assert_eq!(cs.len_of_chunk(0, 0), 0);
        // exact multiple keeps the last chunk full
        assert_eq!(cs.len_of_chunk(1, 8), 4);
    }

    #[test]
    fn test_default_is_valid() {
        assert_eq!(ChunkSize::default().bytes(), ChunkSize::DEFAULT_BYTES);
    }
}
