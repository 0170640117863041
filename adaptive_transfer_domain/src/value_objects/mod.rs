// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects for the transfer domain.
//!
//! Immutable, self-validating types compared by value: identifiers, chunk
//! geometry, digests, and byte ranges.

pub mod byte_range;
pub mod checksum;
pub mod chunk_size;
pub mod upload_id;

pub use byte_range::ByteRange;
pub use checksum::{RollingSha256, Sha256Digest};
pub use chunk_size::ChunkSize;
pub use upload_id::UploadId;
