// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Store Port
//!
//! Transactional metadata store for uploads and chunk rows. This is the
//! authority on chunk existence and upload status: the storage backend is
//! treated as eventually consistent and never consulted for "is this chunk
//! present".
//!
//! ## Contract
//!
//! - `(upload_id, chunk_index)` uniqueness is enforced here
//! - status transitions use CAS semantics ("set X iff current ∈ {...}")
//! - the complete check and the transition to `COMPLETED` happen inside one
//!   transaction, so contending completes serialize and at most one wins
//! - reads observe chunk status changes no later than the commit that set
//!   them

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{ChunkRecord, Upload, UploadStatus};
use crate::error::TransferError;
use crate::value_objects::{Sha256Digest, UploadId};

/// Outcome of claiming a chunk index for execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkClaim {
    /// The row is now `UPLOADING` and owned by the caller.
    Claimed,
    /// The chunk already reached `UPLOADED`; duplicates short-circuit
    /// without rewriting storage when the body hash matches.
    AlreadyUploaded { checksum: Option<Sha256Digest> },
    /// Another task currently holds the row in `UPLOADING`.
    InFlight,
}

/// Outcome of the transactional complete step.
#[derive(Debug, Clone, PartialEq)]
pub enum CompleteOutcome {
    /// All chunk indices were `UPLOADED` and the CAS to `COMPLETED` won.
    Completed,
    /// One or more indices are not `UPLOADED`; nothing was changed.
    MissingChunks(Vec<u64>),
    /// The upload was already in a terminal state.
    AlreadyTerminal(UploadStatus),
}

/// Transactional CRUD over uploads and chunk rows.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Inserts a freshly initialized upload row.
    async fn insert_upload(&self, upload: &Upload) -> Result<(), TransferError>;

    /// Looks up an upload by id.
    async fn find_upload(&self, id: UploadId) -> Result<Option<Upload>, TransferError>;

    /// Atomically sets the status to `to` iff the current status is in
    /// `from`. Returns whether the transition was applied.
    async fn cas_upload_status(
        &self,
        id: UploadId,
        from: &[UploadStatus],
        to: UploadStatus,
    ) -> Result<bool, TransferError>;

    /// Records the storage backend's multipart handle for this upload.
    async fn set_multipart_handle(&self, id: UploadId, handle: &str) -> Result<(), TransferError>;

    /// Records the committed whole-file object key (multipart commit).
    async fn set_storage_key(&self, id: UploadId, key: &str) -> Result<(), TransferError>;

    /// Claims `(upload_id, chunk_index)` for execution: creates the row as
    /// `UPLOADING`, or CASes it from `PENDING`/`FAILED`. A row already
    /// `UPLOADED` or `UPLOADING` is reported instead of overwritten.
    async fn claim_chunk(
        &self,
        upload_id: UploadId,
        chunk_index: u64,
        storage_key: &str,
        retry_count: u32,
    ) -> Result<ChunkClaim, TransferError>;

    /// Marks a claimed chunk `UPLOADED` with its final size, checksum and
    /// backend etag.
    async fn finish_chunk(
        &self,
        upload_id: UploadId,
        chunk_index: u64,
        size_bytes: u64,
        checksum: Option<&Sha256Digest>,
        storage_etag: Option<&str>,
    ) -> Result<(), TransferError>;

    /// Marks a claimed chunk `FAILED` after retry exhaustion.
    async fn fail_chunk(&self, upload_id: UploadId, chunk_index: u64, retry_count: u32) -> Result<(), TransferError>;

    /// All `UPLOADED` chunk rows of an upload, ordered by index.
    async fn uploaded_chunks(&self, upload_id: UploadId) -> Result<Vec<ChunkRecord>, TransferError>;

    /// All chunk rows of an upload regardless of status, ordered by index.
    async fn all_chunks(&self, upload_id: UploadId) -> Result<Vec<ChunkRecord>, TransferError>;

    /// Indices in `0..total_chunks` that have no `UPLOADED` row.
    async fn missing_chunk_indices(&self, upload_id: UploadId, total_chunks: u64) -> Result<Vec<u64>, TransferError>;

    /// Transactionally verifies all chunks are `UPLOADED` and CASes the
    /// upload from an open state to `COMPLETED`.
    async fn complete_upload(&self, id: UploadId, total_chunks: u64) -> Result<CompleteOutcome, TransferError>;

    /// Open uploads whose `updated_at` is older than the cutoff, for stale
    /// cleanup.
    async fn list_stale_uploads(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Upload>, TransferError>;

    /// Bumps `updated_at`, keeping an actively-written upload out of the
    /// stale sweep.
    async fn touch_upload(&self, id: UploadId) -> Result<(), TransferError>;

    /// Deletes the upload row and all of its chunk rows.
    async fn delete_upload(&self, id: UploadId) -> Result<(), TransferError>;

    /// Deletes the chunk rows of an upload, keeping the upload row (used
    /// after an upload reached `ABORTED`).
    async fn delete_chunks(&self, id: UploadId) -> Result<(), TransferError>;

    /// Every storage key referenced by any chunk row, for the orphan scan.
    async fn referenced_storage_keys(&self) -> Result<Vec<String>, TransferError>;
}
