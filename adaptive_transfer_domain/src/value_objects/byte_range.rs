// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Byte Range Value Object
//!
//! Inclusive byte range `[start, end]` within a file, plus the translation
//! math onto chunk boundaries used by the download assembler.
//!
//! A range is only constructible when `start <= end < file_size`, so every
//! instance is satisfiable by definition; parsing and validation failures
//! surface as `TransferError::Range`.
//!
//! ## Chunk Translation
//!
//! For chunk size `c`, the range covers chunks `start / c ..= end / c`. The
//! first chunk is entered at offset `start mod c`, the last chunk is left
//! after offset `end mod c`, and every chunk in between is taken whole.

use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::value_objects::ChunkSize;

/// Validated inclusive byte range within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Creates a range, validating it against the file size.
    pub fn new(start: u64, end: u64, file_size: u64) -> Result<Self, TransferError> {
        if start > end {
            return Err(TransferError::range(format!(
                "range start {} exceeds end {}",
                start, end
            )));
        }
        if end >= file_size {
            return Err(TransferError::range(format!(
                "range end {} is beyond file size {}",
                end, file_size
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses an HTTP `Range` header value against the file size.
    ///
    /// Supports the single-range forms `bytes=a-b`, `bytes=a-` and
    /// `bytes=-n` (final `n` bytes). Multi-range requests and anything not
    /// expressible as one satisfiable range are rejected.
    pub fn parse_http(header: &str, file_size: u64) -> Result<Self, TransferError> {
        let ranges = header
            .strip_prefix("bytes=")
            .ok_or_else(|| TransferError::range(format!("unsupported range unit in '{}'", header)))?;
        if ranges.contains(',') {
            return Err(TransferError::range("multiple ranges are not supported"));
        }

        let (start_s, end_s) = ranges
            .split_once('-')
            .ok_or_else(|| TransferError::range(format!("malformed range '{}'", header)))?;

        let parse = |s: &str| -> Result<u64, TransferError> {
            s.parse::<u64>()
                .map_err(|_| TransferError::range(format!("malformed range '{}'", header)))
        };

        match (start_s.is_empty(), end_s.is_empty()) {
            // bytes=-n : final n bytes
            (true, false) => {
                let suffix = parse(end_s)?;
                if suffix == 0 || file_size == 0 {
                    return Err(TransferError::range(format!(
                        "suffix range '{}' is unsatisfiable for file size {}",
                        header, file_size
                    )));
                }
                let start = file_size.saturating_sub(suffix);
                Self::new(start, file_size - 1, file_size)
            }
            // bytes=a- : from a to the end
            (false, true) => {
                if file_size == 0 {
                    return Err(TransferError::range("range into an empty file"));
                }
                Self::new(parse(start_s)?, file_size - 1, file_size)
            }
            // bytes=a-b
            (false, false) => Self::new(parse(start_s)?, parse(end_s)?, file_size),
            (true, true) => Err(TransferError::range(format!("malformed range '{}'", header))),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes the range covers.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false // start <= end is a construction invariant
    }

    /// First and last chunk index the range touches.
    pub fn chunk_span(&self, chunk_size: ChunkSize) -> (u64, u64) {
        (self.start / chunk_size.bytes(), self.end / chunk_size.bytes())
    }

    /// Sub-slice of chunk `index` that falls inside the range, as
    /// `(offset_within_chunk, length)`. Zero length means the chunk lies
    /// entirely outside the range.
    pub fn slice_of_chunk(&self, index: u64, chunk_size: ChunkSize) -> (u64, u64) {
        let c = chunk_size.bytes();
        let chunk_first = index * c;
        let chunk_last = chunk_first + c - 1;

        let lo = self.start.max(chunk_first);
        let hi = self.end.min(chunk_last);
        if lo > hi {
            return (0, 0);
        }
        (lo - chunk_first, hi - lo + 1)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes {}-{}", self.start, self.end)
    }
}
