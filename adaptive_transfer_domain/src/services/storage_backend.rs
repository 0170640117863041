// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Storage Backend Port
//!
//! Blob storage abstraction for chunk bodies. Implementations (local
//! filesystem, S3-compatible) are substitutable; the metadata store, not the
//! backend, is the source of truth for "chunk present".
//!
//! ## Contract
//!
//! - `put` is idempotent: repeating the same key with identical bytes yields
//!   the same observable state
//! - transient and permanent failures are distinguished through the
//!   `TransferError` variants (`TransientStorage` vs `PermanentStorage`)
//! - durability of a `put` before a multipart commit is not assumed; for
//!   multipart-capable backends the commit establishes durability
//!
//! ## Multipart
//!
//! The multipart set is optional. `begin_multipart` answers `None` when the
//! backend cannot (or chooses not to) run this upload as a multipart object,
//! in which case chunks land as individual objects — always a legal layout.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::TransferError;

/// Stream of chunk body bytes coming back from a backend.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send>>;

/// Read/write/delete of chunk blobs with an optional multipart primitive set.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name used in logs and metric labels.
    fn kind(&self) -> &'static str;

    /// Writes a blob; returns the backend etag when one exists.
    async fn put(&self, key: &str, data: Bytes) -> Result<Option<String>, TransferError>;

    /// Streams a blob from `offset`, at most `length` bytes (to the end when
    /// `None`).
    async fn get(&self, key: &str, offset: u64, length: Option<u64>) -> Result<ByteStream, TransferError>;

    /// Deletes a blob; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), TransferError>;

    /// Lists keys under a prefix, for the orphan scan. Backends that cannot
    /// enumerate answer `None`.
    async fn list_keys(&self, _prefix: &str) -> Result<Option<Vec<String>>, TransferError> {
        Ok(None)
    }

    /// Opens a multipart upload for the object `logical_key`, or `None` when
    /// this upload should fall back to per-chunk objects.
    async fn begin_multipart(&self, _logical_key: &str, _chunk_size: u64) -> Result<Option<String>, TransferError> {
        Ok(None)
    }

    /// Uploads one part under an open multipart handle; returns the part
    /// etag.
    async fn put_part(
        &self,
        _handle: &str,
        _logical_key: &str,
        _part_number: u32,
        _data: Bytes,
    ) -> Result<String, TransferError> {
        Err(TransferError::permanent_storage("backend has no multipart support"))
    }

    /// Commits a multipart upload from `(part_number, etag)` pairs; returns
    /// the final object etag when one exists.
    async fn commit_multipart(
        &self,
        _handle: &str,
        _logical_key: &str,
        _parts: &[(u32, String)],
    ) -> Result<Option<String>, TransferError> {
        Err(TransferError::permanent_storage("backend has no multipart support"))
    }

    /// Aborts a multipart upload, releasing its parts.
    async fn abort_multipart(&self, _handle: &str, _logical_key: &str) -> Result<(), TransferError> {
        Ok(())
    }
}
