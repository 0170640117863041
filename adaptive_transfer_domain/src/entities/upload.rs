// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Entity
//!
//! The upload aggregate: identity, immutable geometry (size, chunk size,
//! total chunk count), and the lifecycle status that moves along the state
//! machine below. The metadata store is the authority for persisted status;
//! this entity encodes which transitions are legal so every mutation path
//! shares one definition.
//!
//! ## Lifecycle
//!
//! ```text
//!           init
//!     ∅ ───────► INITIATED
//!                  │  first chunk accepted
//!                  ▼
//!               IN_PROGRESS
//!                  │  complete (all chunks UPLOADED)
//!                  ▼
//!               COMPLETED
//! INITIATED, IN_PROGRESS ──► FAILED   (unrecoverable completion error)
//! INITIATED, IN_PROGRESS ──► ABORTED  (explicit abort or stale cleanup)
//! ```
//!
//! `COMPLETED`, `FAILED` and `ABORTED` are terminal. An upload with zero
//! chunks (empty file) completes directly from `INITIATED`.
//!
//! ## Invariants
//!
//! - `chunk_size` and `total_chunks` never change after init
//! - `total_chunks == ceil(file_size / chunk_size)`, zero iff the file is
//!   empty
//! - status only changes along the arrows above

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::value_objects::{ChunkSize, Sha256Digest, UploadId};

/// Lifecycle status of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
    Aborted,
}

impl UploadStatus {
    /// Stable wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Initiated => "INITIATED",
            UploadStatus::InProgress => "IN_PROGRESS",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Failed => "FAILED",
            UploadStatus::Aborted => "ABORTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TransferError> {
        match s {
            "INITIATED" => Ok(UploadStatus::Initiated),
            "IN_PROGRESS" => Ok(UploadStatus::InProgress),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "FAILED" => Ok(UploadStatus::Failed),
            "ABORTED" => Ok(UploadStatus::Aborted),
            other => Err(TransferError::internal(format!("unknown upload status '{}'", other))),
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Failed | UploadStatus::Aborted
        )
    }

    /// Chunk acceptance is only legal while the upload is open.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, UploadStatus::Initiated | UploadStatus::InProgress)
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Initiated, InProgress)
                | (Initiated, Completed)
                | (Initiated, Failed)
                | (Initiated, Aborted)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Aborted)
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resumable chunked upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    id: UploadId,
    owner: String,
    file_name: String,
    file_size: u64,
    chunk_size: ChunkSize,
    total_chunks: u64,
    file_checksum: Option<Sha256Digest>,
    status: UploadStatus,
    multipart_handle: Option<String>,
    storage_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Upload {
    /// Creates a new upload in `INITIATED` state.
    ///
    /// Validates the request surface and fixes the chunk geometry for the
    /// lifetime of the upload.
    pub fn new(
        owner: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        chunk_size: ChunkSize,
        file_checksum: Option<Sha256Digest>,
    ) -> Result<Self, TransferError> {
        let owner = owner.into();
        let file_name = file_name.into();

        if owner.is_empty() {
            return Err(TransferError::validation("upload owner must not be empty"));
        }
        if file_name.is_empty() {
            return Err(TransferError::validation("file name must not be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: UploadId::new(),
            owner,
            file_name,
            file_size,
            total_chunks: chunk_size.chunks_needed(file_size),
            chunk_size,
            file_checksum,
            status: UploadStatus::Initiated,
            multipart_handle: None,
            storage_key: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rehydrates an upload from persisted fields without re-validating.
    ///
    /// The metadata store owns the persisted representation; this
    /// constructor trusts it.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: UploadId,
        owner: String,
        file_name: String,
        file_size: u64,
        chunk_size: ChunkSize,
        total_chunks: u64,
        file_checksum: Option<Sha256Digest>,
        status: UploadStatus,
        multipart_handle: Option<String>,
        storage_key: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            file_name,
            file_size,
            chunk_size,
            total_chunks,
            file_checksum,
            status,
            multipart_handle,
            storage_key,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn file_checksum(&self) -> Option<&Sha256Digest> {
        self.file_checksum.as_ref()
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn multipart_handle(&self) -> Option<&str> {
        self.multipart_handle.as_deref()
    }

    /// Key of the committed whole-file object when the upload finished
    /// through a multipart commit.
    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_owned_by(&self, principal: &str) -> bool {
        self.owner == principal
    }

    /// Rejects indices at or past the chunk count.
    pub fn validate_chunk_index(&self, index: u64) -> Result<(), TransferError> {
        if index >= self.total_chunks {
            return Err(TransferError::validation(format!(
                "chunk index {} out of range for upload with {} chunks",
                index, self.total_chunks
            )));
        }
        Ok(())
    }

    /// Expected byte length of the chunk at `index`.
    pub fn expected_chunk_len(&self, index: u64) -> u64 {
        self.chunk_size.len_of_chunk(index, self.file_size)
    }

    /// Applies a state transition, rejecting anything the state machine
    /// forbids.
    pub fn transition(&mut self, next: UploadStatus) -> Result<(), TransferError> {
        if !self.status.can_transition_to(next) {
            return Err(TransferError::conflict(format!(
                "illegal upload transition {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_multipart_handle(&mut self, handle: impl Into<String>) {
        self.multipart_handle = Some(handle.into());
        self.updated_at = Utc::now();
    }

    pub fn set_storage_key(&mut self, key: impl Into<String>) {
        self.storage_key = Some(key.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(file_size: u64, chunk_size: u64) -> Upload {
        Upload::new("alice", "report.bin", file_size, ChunkSize::new(chunk_size).unwrap(), None).unwrap()
    }

    #[test]
    fn test_new_upload_geometry() {
        let u = upload(10, 4);
        assert_eq!(u.total_chunks(), 3);
        assert_eq!(u.status(), UploadStatus::Initiated);
        assert_eq!(u.expected_chunk_len(0), 4);
        assert_eq!(u.expected_chunk_len(2), 2);
    }

    #[test]
    fn test_empty_upload_has_no_chunks() {
        let u = upload(0, 4);
        assert_eq!(u.total_chunks(), 0);
        assert!(u.validate_chunk_index(0).is_err());
    }

    #[test]
    fn test_rejects_blank_fields() {
        assert!(Upload::new("", "f", 1, ChunkSize::default(), None).is_err());
        assert!(Upload::new("alice", "", 1, ChunkSize::default(), None).is_err());
    }

    #[test]
    fn test_legal_transitions() {
        let mut u = upload(10, 4);
        u.transition(UploadStatus::InProgress).unwrap();
        u.transition(UploadStatus::Completed).unwrap();
        assert!(u.is_terminal());
    }

    #[test]
    fn test_empty_file_completes_from_initiated() {
        let mut u = upload(0, 4);
        u.transition(UploadStatus::Completed).unwrap();
        assert_eq!(u.status(), UploadStatus::Completed);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for terminal in [UploadStatus::Completed, UploadStatus::Failed, UploadStatus::Aborted] {
            let mut u = upload(10, 4);
            u.transition(terminal).unwrap_or_else(|_| {
                u.transition(UploadStatus::InProgress).unwrap();
                u.transition(terminal).unwrap();
            });
            for next in [
                UploadStatus::Initiated,
                UploadStatus::InProgress,
                UploadStatus::Completed,
                UploadStatus::Failed,
                UploadStatus::Aborted,
            ] {
                assert!(u.clone().transition(next).is_err(), "{} -> {} must fail", terminal, next);
            }
        }
    }

    #[test]
    fn test_chunk_acceptance_window() {
        assert!(UploadStatus::Initiated.accepts_chunks());
        assert!(UploadStatus::InProgress.accepts_chunks());
        assert!(!UploadStatus::Completed.accepts_chunks());
        assert!(!UploadStatus::Failed.accepts_chunks());
        assert!(!UploadStatus::Aborted.accepts_chunks());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            UploadStatus::Initiated,
            UploadStatus::InProgress,
            UploadStatus::Completed,
            UploadStatus::Failed,
            UploadStatus::Aborted,
        ] {
            assert_eq!(UploadStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(UploadStatus::parse("NOPE").is_err());
    }
}
