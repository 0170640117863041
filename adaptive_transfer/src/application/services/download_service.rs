// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Download Assembler
//!
//! Streams a COMPLETED upload back to the client: chunk blobs concatenated
//! in index order, or the committed whole-file object when the upload
//! finished through a multipart commit.
//!
//! For a ranged request `[a, b]` the range is translated onto chunk
//! boundaries: the first chunk is entered at `a mod chunk_size`, the last
//! chunk is cut after `b mod chunk_size`, chunks in between stream whole.
//! Malformed or unsatisfiable ranges fail with a range error before any
//! storage read.

use futures::TryStreamExt;
use std::sync::Arc;
use tracing::debug;

use adaptive_transfer_domain::{
    ByteRange, ByteStream, StorageBackend, TransferError, Upload, UploadId, UploadStatus, UploadStore,
};

use crate::infrastructure::metrics::MetricsService;

/// A ready-to-send download: metadata plus the body stream.
pub struct DownloadStream {
    pub file_name: String,
    pub file_size: u64,
    /// Bytes the stream will yield.
    pub content_length: u64,
    /// Present for ranged (206) responses.
    pub range: Option<ByteRange>,
    pub stream: ByteStream,
}

/// Ordered streaming of persisted chunks with range translation.
pub struct DownloadService {
    store: Arc<dyn UploadStore>,
    storage: Arc<dyn StorageBackend>,
    metrics: Arc<MetricsService>,
}

impl DownloadService {
    pub fn new(store: Arc<dyn UploadStore>, storage: Arc<dyn StorageBackend>, metrics: Arc<MetricsService>) -> Self {
        Self { store, storage, metrics }
    }

    /// Builds the download stream for an upload the principal owns.
    pub async fn download(
        &self,
        principal: &str,
        upload_id: UploadId,
        range_header: Option<&str>,
    ) -> Result<DownloadStream, TransferError> {
        let upload = self
            .store
            .find_upload(upload_id)
            .await?
            .ok_or_else(|| TransferError::not_found(format!("upload {}", upload_id)))?;
        if !upload.is_owned_by(principal) {
            return Err(TransferError::auth(format!("upload {} is not owned by this principal", upload_id)));
        }
        if upload.status() != UploadStatus::Completed {
            return Err(TransferError::conflict(format!(
                "upload {} is {}, not COMPLETED",
                upload_id,
                upload.status()
            )));
        }

        let range = range_header
            .map(|header| ByteRange::parse_http(header, upload.file_size()))
            .transpose()?;

        let content_length = range.map(|r| r.len()).unwrap_or(upload.file_size());
        let stream = self.body_stream(&upload, range).await?;

        self.metrics.record_download(content_length);
        debug!(
            upload_id = %upload_id,
            content_length,
            ranged = range.is_some(),
            "download stream ready"
        );

        Ok(DownloadStream {
            file_name: upload.file_name().to_string(),
            file_size: upload.file_size(),
            content_length,
            range,
            stream,
        })
    }

    async fn body_stream(&self, upload: &Upload, range: Option<ByteRange>) -> Result<ByteStream, TransferError> {
        if upload.file_size() == 0 {
            return Ok(Box::pin(futures::stream::empty()));
        }

        // Multipart-committed uploads read the single object; the backend
        // does the range natively.
        if let Some(object_key) = upload.storage_key() {
            let (offset, length) = match range {
                Some(r) => (r.start(), Some(r.len())),
                None => (0, None),
            };
            return self.storage.get(object_key, offset, length).await;
        }

        // Per-chunk assembly: plan (key, offset, length) per touched chunk,
        // then flatten the blob streams in order.
        let chunks = self.store.uploaded_chunks(upload.id()).await?;
        if chunks.len() as u64 != upload.total_chunks() {
            return Err(TransferError::internal(format!(
                "upload {} is COMPLETED but only {}/{} chunks are readable",
                upload.id(),
                chunks.len(),
                upload.total_chunks()
            )));
        }

        let chunk_size = upload.chunk_size();
        let mut plan: Vec<(String, u64, u64)> = Vec::new();
        match range {
            None => {
                for chunk in &chunks {
                    plan.push((chunk.storage_key.clone(), 0, chunk.size_bytes));
                }
            }
            Some(range) => {
                let (start_chunk, end_chunk) = range.chunk_span(chunk_size);
                for chunk in &chunks {
                    if chunk.chunk_index < start_chunk || chunk.chunk_index > end_chunk {
                        continue;
                    }
                    let (offset, length) = range.slice_of_chunk(chunk.chunk_index, chunk_size);
                    if length > 0 {
                        plan.push((chunk.storage_key.clone(), offset, length));
                    }
                }
            }
        }

        let storage = Arc::clone(&self.storage);
        let stream = futures::stream::iter(plan.into_iter().map(Ok::<_, TransferError>))
            .and_then(move |(key, offset, length)| {
                let storage = Arc::clone(&storage);
                async move { storage.get(&key, offset, Some(length)).await }
            })
            .try_flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{schema, SqliteUploadStore};
    use crate::infrastructure::storage::LocalStorage;
    use adaptive_transfer_domain::{ChunkRecord, ChunkSize, Sha256Digest};
    use bytes::Bytes;
    use futures::StreamExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<SqliteUploadStore>,
        service: DownloadService,
        upload: Upload,
    }

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.extend_from_slice(&item.unwrap());
        }
        out
    }

    /// Seeds a completed 10-byte upload "0123456789" in chunks of 4.
    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let store = Arc::new(SqliteUploadStore::new(schema::in_memory_pool().await.unwrap()));
        let metrics = Arc::new(crate::infrastructure::metrics::MetricsService::new().unwrap());

        let upload = Upload::new("alice", "digits.bin", 10, ChunkSize::new(4).unwrap(), None).unwrap();
        store.insert_upload(&upload).await.unwrap();

        for (index, body) in [(0u64, &b"0123"[..]), (1, &b"4567"[..]), (2, &b"89"[..])] {
            let key = ChunkRecord::storage_key_for(upload.id(), index);
            storage.put(&key, Bytes::copy_from_slice(body)).await.unwrap();
            store.claim_chunk(upload.id(), index, &key, 0).await.unwrap();
            store
                .finish_chunk(upload.id(), index, body.len() as u64, Some(&Sha256Digest::compute(body)), None)
                .await
                .unwrap();
        }
        store.complete_upload(upload.id(), 3).await.unwrap();

        let service = DownloadService::new(
            store.clone() as Arc<dyn UploadStore>,
            storage as Arc<dyn StorageBackend>,
            metrics,
        );
        Fixture {
            _dir: dir,
            store,
            service,
            upload,
        }
    }

    #[tokio::test]
    async fn test_full_download_concatenates_in_order() {
        let f = fixture().await;
        let download = f.service.download("alice", f.upload.id(), None).await.unwrap();
        assert_eq!(download.content_length, 10);
        assert!(download.range.is_none());
        assert_eq!(collect(download.stream).await, b"0123456789");
    }

    #[tokio::test]
    async fn test_range_across_chunk_boundary() {
        let f = fixture().await;
        let download = f.service.download("alice", f.upload.id(), Some("bytes=2-7")).await.unwrap();
        assert_eq!(download.content_length, 6);
        assert_eq!(collect(download.stream).await, b"234567");
    }

    #[tokio::test]
    async fn test_range_single_chunk_and_suffix() {
        let f = fixture().await;

        let download = f.service.download("alice", f.upload.id(), Some("bytes=5-6")).await.unwrap();
        assert_eq!(collect(download.stream).await, b"56");

        let download = f.service.download("alice", f.upload.id(), Some("bytes=-3")).await.unwrap();
        assert_eq!(collect(download.stream).await, b"789");
    }

    #[tokio::test]
    async fn test_bad_ranges_fail_without_reads() {
        let f = fixture().await;
        for header in ["bytes=7-2", "bytes=0-10", "bytes=10-", "bogus"] {
            let err = f.service.download("alice", f.upload.id(), Some(header)).await.err().unwrap();
            assert!(matches!(err, TransferError::Range(_)), "{}", header);
        }
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let f = fixture().await;
        let err = f.service.download("mallory", f.upload.id(), None).await.err().unwrap();
        assert!(matches!(err, TransferError::Auth(_)));
    }

    #[tokio::test]
    async fn test_incomplete_upload_refused() {
        let f = fixture().await;
        let open = Upload::new("alice", "open.bin", 8, ChunkSize::new(4).unwrap(), None).unwrap();
        f.store.insert_upload(&open).await.unwrap();

        let err = f.service.download("alice", open.id(), None).await.err().unwrap();
        assert!(matches!(err, TransferError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_empty_upload_streams_zero_bytes() {
        let f = fixture().await;
        let empty = Upload::new("alice", "empty.bin", 0, ChunkSize::new(4).unwrap(), None).unwrap();
        f.store.insert_upload(&empty).await.unwrap();
        f.store.complete_upload(empty.id(), 0).await.unwrap();

        let download = f.service.download("alice", empty.id(), None).await.unwrap();
        assert_eq!(download.content_length, 0);
        assert!(collect(download.stream).await.is_empty());

        // but a range into an empty file is unsatisfiable
        let err = f.service.download("alice", empty.id(), Some("bytes=0-0")).await.err().unwrap();
        assert!(matches!(err, TransferError::Range(_)));
    }
}
