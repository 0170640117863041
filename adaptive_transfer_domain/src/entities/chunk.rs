// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Record
//!
//! Per-chunk metadata row, unique by `(upload_id, chunk_index)`. Rows are
//! created lazily on first acceptance of an index and destroyed with their
//! upload. A chunk becomes observable to complete/download only once its
//! status is `UPLOADED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::value_objects::{Sha256Digest, UploadId};

/// Execution status of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "PENDING",
            ChunkStatus::Uploading => "UPLOADING",
            ChunkStatus::Uploaded => "UPLOADED",
            ChunkStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TransferError> {
        match s {
            "PENDING" => Ok(ChunkStatus::Pending),
            "UPLOADING" => Ok(ChunkStatus::Uploading),
            "UPLOADED" => Ok(ChunkStatus::Uploaded),
            "FAILED" => Ok(ChunkStatus::Failed),
            other => Err(TransferError::internal(format!("unknown chunk status '{}'", other))),
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one chunk of an upload.
///
/// `size_bytes` equals the upload's chunk size for every index except
/// possibly the last; `storage_etag` is only present for backends that
/// return one (S3 objects and multipart parts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub upload_id: UploadId,
    pub chunk_index: u64,
    pub size_bytes: u64,
    pub checksum: Option<Sha256Digest>,
    pub storage_key: String,
    pub storage_etag: Option<String>,
    pub status: ChunkStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Blob key shared by every storage backend: `<upload_id>/<chunk_index>`.
    pub fn storage_key_for(upload_id: UploadId, chunk_index: u64) -> String {
        format!("{}/{}", upload_id, chunk_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_shape() {
        let id = UploadId::new();
        assert_eq!(ChunkRecord::storage_key_for(id, 7), format!("{}/7", id));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ChunkStatus::Pending,
            ChunkStatus::Uploading,
            ChunkStatus::Uploaded,
            ChunkStatus::Failed,
        ] {
            assert_eq!(ChunkStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ChunkStatus::parse("???").is_err());
    }
}
