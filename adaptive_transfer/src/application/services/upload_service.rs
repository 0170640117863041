// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Service
//!
//! Orchestrates the upload lifecycle: init, chunk acceptance, resume
//! queries, complete, and abort.
//!
//! The chunk acceptance path follows a fixed order - validate, idempotency
//! reserve, limiter admission, task submission, wait for the completion
//! signal - where only the submission and the wait can suspend. A wait
//! timeout surfaces as an error while the task keeps running and updates
//! metadata on its own schedule.
//!
//! Complete performs, in order: missing-chunk precheck, multipart commit
//! (when active), whole-file checksum verification, then the transactional
//! all-uploaded check + CAS to `COMPLETED` in the metadata store, which
//! serializes contending completes.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use adaptive_transfer_domain::{
    ChunkRecord, ChunkSize, ChunkTask, CompleteOutcome, DurableQueue, IdempotencyStore, OperationKind, Reservation,
    RollingSha256, Sha256Digest, StorageBackend, TransferError, Upload, UploadId, UploadStatus, UploadStore,
};

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::{AdmissionController, CompletionRegistry};

/// Tunables the upload service needs from the configuration surface.
#[derive(Debug, Clone)]
pub struct UploadServiceConfig {
    pub default_chunk_size: u64,
    pub max_chunk_size: u64,
    pub idempotency_ttl_seconds: i64,
    pub queue_put_timeout: Duration,
    pub task_wait_timeout: Duration,
    /// Where durable-mode chunk bodies are staged; `None` keeps bodies in
    /// memory (direct mode).
    pub staging_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: Option<u64>,
    /// Derivable; validated against the server-side computation when sent.
    pub total_chunks: Option<u64>,
    pub file_checksum_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitUploadResponse {
    pub upload_id: UploadId,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkAccepted {
    pub upload_id: UploadId,
    pub chunk_index: u64,
    /// The body was already persisted; no new storage write happened.
    pub duplicate: bool,
}

/// Typed outcome of complete, so the API layer can map 200 / 409 / 423
/// without string inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum CompleteResult {
    Completed,
    MissingChunks(Vec<u64>),
    AlreadyTerminal(UploadStatus),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadStatusReport {
    pub upload_id: UploadId,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub status: String,
    pub uploaded_chunks: u64,
    pub bytes_received: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upload lifecycle orchestration.
pub struct UploadService {
    store: Arc<dyn UploadStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    storage: Arc<dyn StorageBackend>,
    queue: Arc<dyn DurableQueue>,
    admission: Arc<AdmissionController>,
    registry: Arc<CompletionRegistry>,
    metrics: Arc<MetricsService>,
    config: UploadServiceConfig,
}

impl UploadService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn UploadStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        storage: Arc<dyn StorageBackend>,
        queue: Arc<dyn DurableQueue>,
        admission: Arc<AdmissionController>,
        registry: Arc<CompletionRegistry>,
        metrics: Arc<MetricsService>,
        config: UploadServiceConfig,
    ) -> Self {
        Self {
            store,
            idempotency,
            storage,
            queue,
            admission,
            registry,
            metrics,
            config,
        }
    }

    /// Creates a new upload in `INITIATED` state.
    pub async fn init(
        &self,
        principal: &str,
        request: InitUploadRequest,
        idempotency_key: Option<&str>,
    ) -> Result<InitUploadResponse, TransferError> {
        let chunk_size = ChunkSize::new(request.chunk_size.unwrap_or(self.config.default_chunk_size))?;
        if chunk_size.bytes() > self.config.max_chunk_size {
            return Err(TransferError::validation(format!(
                "chunk size {} exceeds the configured maximum {}",
                chunk_size.bytes(),
                self.config.max_chunk_size
            )));
        }
        let expected_total = chunk_size.chunks_needed(request.file_size);
        if let Some(declared) = request.total_chunks {
            if declared != expected_total {
                return Err(TransferError::validation(format!(
                    "total_chunks {} does not match ceil({} / {}) = {}",
                    declared,
                    request.file_size,
                    chunk_size.bytes(),
                    expected_total
                )));
            }
        }
        let checksum = request
            .file_checksum_sha256
            .as_deref()
            .map(Sha256Digest::from_hex)
            .transpose()?;

        let fingerprint = fingerprint(&[
            "init",
            principal,
            &request.file_name,
            &request.file_size.to_string(),
            &chunk_size.bytes().to_string(),
            &checksum.map(|c| c.to_hex()).unwrap_or_else(|| "-".into()),
        ]);
        if let Some(key) = idempotency_key {
            match self.reserve(OperationKind::Init, key, &fingerprint).await? {
                Some(prior) => {
                    let response: InitUploadResponse = serde_json::from_value(prior)?;
                    return Ok(response);
                }
                None => {}
            }
        }

        let result = self
            .init_fresh(principal, &request, chunk_size, checksum)
            .await;

        self.settle_idempotency(OperationKind::Init, idempotency_key, &result)
            .await;
        result
    }

    async fn init_fresh(
        &self,
        principal: &str,
        request: &InitUploadRequest,
        chunk_size: ChunkSize,
        checksum: Option<Sha256Digest>,
    ) -> Result<InitUploadResponse, TransferError> {
        let mut upload = Upload::new(principal, request.file_name.clone(), request.file_size, chunk_size, checksum)?;

        // Multipart is the backend's choice; per-chunk objects are always a
        // legal fallback.
        if upload.total_chunks() > 0 {
            if let Some(handle) = self
                .storage
                .begin_multipart(&upload.id().to_string(), chunk_size.bytes())
                .await?
            {
                upload.set_multipart_handle(handle);
            }
        }

        self.store.insert_upload(&upload).await?;
        self.metrics.record_upload_initiated();
        info!(
            upload_id = %upload.id(),
            owner = principal,
            file_size = request.file_size,
            total_chunks = upload.total_chunks(),
            multipart = upload.multipart_handle().is_some(),
            "upload initiated"
        );

        Ok(InitUploadResponse {
            upload_id: upload.id(),
            chunk_size: chunk_size.bytes(),
            total_chunks: upload.total_chunks(),
        })
    }

    /// Accepts one chunk body: admission, submission, and the bounded wait
    /// for the executor's terminal outcome.
    pub async fn accept_chunk(
        &self,
        principal: &str,
        upload_id: UploadId,
        chunk_index: u64,
        body: Bytes,
        declared_checksum: Option<Sha256Digest>,
        idempotency_key: Option<&str>,
    ) -> Result<ChunkAccepted, TransferError> {
        let upload = self.authorized_upload(principal, upload_id).await?;

        if !upload.status().accepts_chunks() {
            return Err(TransferError::conflict(format!(
                "upload {} is {} and no longer accepts chunks",
                upload_id,
                upload.status()
            )));
        }
        upload.validate_chunk_index(chunk_index)?;

        let expected_len = upload.expected_chunk_len(chunk_index);
        if body.len() as u64 != expected_len {
            return Err(TransferError::validation(format!(
                "chunk {} must be {} bytes, got {}",
                chunk_index,
                expected_len,
                body.len()
            )));
        }

        let body_digest = Sha256Digest::compute(&body);
        if let Some(declared) = &declared_checksum {
            if *declared != body_digest {
                return Err(TransferError::checksum(format!(
                    "chunk {} does not match its declared checksum",
                    chunk_index
                )));
            }
        }

        let fingerprint = fingerprint(&["chunk", &upload_id.to_string(), &chunk_index.to_string(), &body_digest.to_hex()]);
        if let Some(key) = idempotency_key {
            match self.reserve(OperationKind::Chunk, key, &fingerprint).await? {
                Some(prior) => {
                    let response: ChunkAccepted = serde_json::from_value(prior)?;
                    return Ok(response);
                }
                None => {}
            }
        }

        let result = self
            .accept_fresh(&upload, chunk_index, body, declared_checksum, body_digest)
            .await;

        self.settle_idempotency(OperationKind::Chunk, idempotency_key, &result)
            .await;
        result
    }

    async fn accept_fresh(
        &self,
        upload: &Upload,
        chunk_index: u64,
        body: Bytes,
        declared_checksum: Option<Sha256Digest>,
        body_digest: Sha256Digest,
    ) -> Result<ChunkAccepted, TransferError> {
        let upload_id = upload.id();

        // First accepted chunk moves the upload to IN_PROGRESS; losing the
        // CAS just means another chunk got there first.
        let _ = self
            .store
            .cas_upload_status(upload_id, &[UploadStatus::Initiated], UploadStatus::InProgress)
            .await?;

        let permit = match self.admission.admit(upload_id, self.config.queue_put_timeout).await {
            Ok(permit) => permit,
            Err(e) => {
                if let Some(reason) = e.backpressure_reason() {
                    self.metrics.record_admission_rejection(reason);
                }
                return Err(e);
            }
        };

        let task_id = Uuid::new_v4().to_string();
        let mut task = ChunkTask {
            task_id: task_id.clone(),
            upload_id,
            chunk_index,
            storage_key: ChunkRecord::storage_key_for(upload_id, chunk_index),
            multipart_handle: upload.multipart_handle().map(str::to_string),
            expected_checksum: declared_checksum,
            body_digest,
            retry_count: 0,
            staging_path: None,
            bytes: body,
            delivery_token: None,
        };

        // Durable mode ships a staging-path reference instead of the body.
        if let Some(staging_dir) = &self.config.staging_dir {
            let path = staging_dir.join(&task_id);
            tokio::fs::create_dir_all(staging_dir).await?;
            tokio::fs::write(&path, &task.bytes).await?;
            task.staging_path = Some(path.to_string_lossy().into_owned());
            task.bytes = Bytes::new();
        }

        let waiter = self.registry.register(&task_id, permit);
        if let Err(e) = self.queue.enqueue(task, self.config.queue_put_timeout).await {
            if let Some(reason) = e.backpressure_reason() {
                self.metrics.record_admission_rejection(reason);
            }
            // Drop the registry entry (and with it the permit).
            self.registry.complete(&task_id, Err(e.clone()));
            return Err(e);
        }
        self.metrics.record_chunk_accepted();
        debug!(upload_id = %upload_id, chunk_index, task_id = %task_id, "chunk task submitted");

        // The wait is bounded; its expiry does not cancel the task.
        match tokio::time::timeout(self.config.task_wait_timeout, waiter).await {
            Ok(Ok(Ok(outcome))) => Ok(ChunkAccepted {
                upload_id,
                chunk_index: outcome.chunk_index,
                duplicate: outcome.duplicate,
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(TransferError::internal("chunk executor dropped the completion signal")),
            Err(_) => Err(TransferError::timeout(format!(
                "chunk {} is still being persisted; retry to observe its outcome",
                chunk_index
            ))),
        }
    }

    /// Indices not yet `UPLOADED`, for client resume.
    pub async fn missing_chunks(&self, principal: &str, upload_id: UploadId) -> Result<Vec<u64>, TransferError> {
        let upload = self.authorized_upload(principal, upload_id).await?;
        self.store
            .missing_chunk_indices(upload_id, upload.total_chunks())
            .await
    }

    /// Progress report for one upload.
    pub async fn status(&self, principal: &str, upload_id: UploadId) -> Result<UploadStatusReport, TransferError> {
        let upload = self.authorized_upload(principal, upload_id).await?;
        let uploaded = self.store.uploaded_chunks(upload_id).await?;
        Ok(UploadStatusReport {
            upload_id,
            file_name: upload.file_name().to_string(),
            file_size: upload.file_size(),
            chunk_size: upload.chunk_size().bytes(),
            total_chunks: upload.total_chunks(),
            status: upload.status().as_str().to_string(),
            uploaded_chunks: uploaded.len() as u64,
            bytes_received: uploaded.iter().map(|c| c.size_bytes).sum(),
            created_at: upload.created_at(),
            updated_at: upload.updated_at(),
        })
    }

    /// Finalizes the upload.
    pub async fn complete(
        &self,
        principal: &str,
        upload_id: UploadId,
        file_checksum_sha256: Option<String>,
        idempotency_key: Option<&str>,
    ) -> Result<CompleteResult, TransferError> {
        let upload = self.authorized_upload(principal, upload_id).await?;
        let declared = file_checksum_sha256.as_deref().map(Sha256Digest::from_hex).transpose()?;

        let fingerprint = fingerprint(&[
            "complete",
            &upload_id.to_string(),
            &declared.map(|c| c.to_hex()).unwrap_or_else(|| "-".into()),
        ]);
        if let Some(key) = idempotency_key {
            match self.reserve(OperationKind::Complete, key, &fingerprint).await? {
                Some(_prior) => return Ok(CompleteResult::Completed),
                None => {}
            }
        }

        let result = self.complete_fresh(&upload, declared).await;

        // Only a won completion is worth replaying.
        match &result {
            Ok(CompleteResult::Completed) => {
                if let Some(key) = idempotency_key {
                    let value = serde_json::json!({"status": UploadStatus::Completed.as_str()});
                    if let Err(e) = self.idempotency.store_result(OperationKind::Complete, key, &value).await {
                        warn!(error = %e, "cannot store complete idempotency result");
                    }
                }
            }
            _ => {
                if let Some(key) = idempotency_key {
                    let _ = self.idempotency.release(OperationKind::Complete, key).await;
                }
            }
        }
        result
    }

    async fn complete_fresh(
        &self,
        upload: &Upload,
        declared_checksum: Option<Sha256Digest>,
    ) -> Result<CompleteResult, TransferError> {
        let upload_id = upload.id();
        if upload.is_terminal() {
            return Ok(CompleteResult::AlreadyTerminal(upload.status()));
        }

        let missing = self
            .store
            .missing_chunk_indices(upload_id, upload.total_chunks())
            .await?;
        if !missing.is_empty() {
            return Ok(CompleteResult::MissingChunks(missing));
        }

        // A checksum sent at complete time must agree with the one fixed at
        // init.
        let expected_checksum = match (declared_checksum, upload.file_checksum().copied()) {
            (Some(at_complete), Some(at_init)) if at_complete != at_init => {
                return Err(TransferError::conflict(
                    "file checksum at complete differs from the checksum fixed at init",
                ));
            }
            (at_complete, at_init) => at_complete.or(at_init),
        };

        // Multipart commit before verification: parts are only readable as
        // one object after the commit.
        let object_key = if let Some(handle) = upload.multipart_handle() {
            let chunks = self.store.uploaded_chunks(upload_id).await?;
            let mut parts = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                match &chunk.storage_etag {
                    Some(etag) => parts.push(((chunk.chunk_index + 1) as u32, etag.clone())),
                    None => {
                        return Err(TransferError::permanent_storage(format!(
                            "chunk {} has no part etag; multipart commit impossible",
                            chunk.chunk_index
                        )))
                    }
                }
            }
            let key = upload_id.to_string();
            self.storage.commit_multipart(handle, &key, &parts).await?;
            self.store.set_storage_key(upload_id, &key).await?;
            Some(key)
        } else {
            None
        };

        if let Some(expected) = expected_checksum {
            let actual = self.compute_file_checksum(upload, object_key.as_deref()).await?;
            if actual != expected {
                let failed = self
                    .store
                    .cas_upload_status(
                        upload_id,
                        &[UploadStatus::Initiated, UploadStatus::InProgress],
                        UploadStatus::Failed,
                    )
                    .await?;
                if failed {
                    self.metrics.record_upload_failed();
                }
                return Err(TransferError::checksum(format!(
                    "file checksum mismatch: expected {}, computed {}",
                    expected, actual
                )));
            }
        }

        match self.store.complete_upload(upload_id, upload.total_chunks()).await? {
            CompleteOutcome::Completed => {
                self.metrics.record_upload_completed();
                info!(upload_id = %upload_id, total_chunks = upload.total_chunks(), "upload completed");
                Ok(CompleteResult::Completed)
            }
            CompleteOutcome::MissingChunks(missing) => Ok(CompleteResult::MissingChunks(missing)),
            CompleteOutcome::AlreadyTerminal(status) => Ok(CompleteResult::AlreadyTerminal(status)),
        }
    }

    /// Explicit abort: CAS to `ABORTED` and best-effort blob cleanup.
    pub async fn abort(&self, principal: &str, upload_id: UploadId) -> Result<(), TransferError> {
        let upload = self.authorized_upload(principal, upload_id).await?;
        if upload.is_terminal() {
            return Err(TransferError::conflict(format!(
                "upload {} is already {}",
                upload_id,
                upload.status()
            )));
        }

        let won = self
            .store
            .cas_upload_status(
                upload_id,
                &[UploadStatus::Initiated, UploadStatus::InProgress],
                UploadStatus::Aborted,
            )
            .await?;
        if !won {
            return Err(TransferError::conflict(format!("upload {} reached a terminal state first", upload_id)));
        }

        self.metrics.record_upload_aborted();
        self.cleanup_aborted_upload(&upload).await;
        info!(upload_id = %upload_id, "upload aborted");
        Ok(())
    }

    /// Blob and row cleanup shared by explicit abort and stale cleanup.
    /// Best-effort: the upload row already reached `ABORTED`.
    pub async fn cleanup_aborted_upload(&self, upload: &Upload) {
        let upload_id = upload.id();

        if let Some(handle) = upload.multipart_handle() {
            if let Err(e) = self.storage.abort_multipart(handle, &upload_id.to_string()).await {
                warn!(upload_id = %upload_id, error = %e, "multipart abort failed");
            }
        }

        match self.store.all_chunks(upload_id).await {
            Ok(chunks) => {
                for chunk in chunks {
                    if let Err(e) = self.storage.delete(&chunk.storage_key).await {
                        warn!(upload_id = %upload_id, chunk_index = chunk.chunk_index, error = %e, "blob delete failed");
                    }
                }
            }
            Err(e) => warn!(upload_id = %upload_id, error = %e, "cannot list chunks for cleanup"),
        }

        if let Err(e) = self.store.delete_chunks(upload_id).await {
            warn!(upload_id = %upload_id, error = %e, "cannot delete chunk rows");
        }
    }

    /// Rolling hash over the file content, chunk by chunk in index order
    /// (one open blob at a time), or over the committed object.
    async fn compute_file_checksum(&self, upload: &Upload, object_key: Option<&str>) -> Result<Sha256Digest, TransferError> {
        let mut hasher = RollingSha256::new();

        let keys: Vec<String> = match object_key {
            Some(key) => vec![key.to_string()],
            None => self
                .store
                .uploaded_chunks(upload.id())
                .await?
                .into_iter()
                .map(|chunk| chunk.storage_key)
                .collect(),
        };

        for key in keys {
            let mut stream = self.storage.get(&key, 0, None).await?;
            while let Some(item) = stream.next().await {
                hasher.update(&item?);
            }
        }
        Ok(hasher.finalize())
    }

    async fn authorized_upload(&self, principal: &str, upload_id: UploadId) -> Result<Upload, TransferError> {
        let upload = self
            .store
            .find_upload(upload_id)
            .await?
            .ok_or_else(|| TransferError::not_found(format!("upload {}", upload_id)))?;
        if !upload.is_owned_by(principal) {
            return Err(TransferError::auth(format!("upload {} is not owned by this principal", upload_id)));
        }
        Ok(upload)
    }

    /// Reserves an idempotency key. `Ok(Some(value))` is a replay,
    /// `Ok(None)` means the caller owns the operation.
    async fn reserve(
        &self,
        kind: OperationKind,
        key: &str,
        fingerprint: &Sha256Digest,
    ) -> Result<Option<serde_json::Value>, TransferError> {
        match self
            .idempotency
            .reserve(kind, key, fingerprint, self.config.idempotency_ttl_seconds)
            .await?
        {
            Reservation::Fresh => Ok(None),
            Reservation::Replay(value) => {
                debug!(kind = %kind, key, "idempotent replay");
                Ok(Some(value))
            }
            Reservation::InFlight => Err(TransferError::conflict(format!(
                "operation for idempotency key '{}' is still in progress",
                key
            ))),
            Reservation::Conflict => Err(TransferError::conflict(format!(
                "idempotency key '{}' was used with a different request",
                key
            ))),
        }
    }

    /// Stores the result of a freshly owned operation, or releases the
    /// reservation on failure so a later retry starts over.
    async fn settle_idempotency<T: Serialize>(
        &self,
        kind: OperationKind,
        key: Option<&str>,
        result: &Result<T, TransferError>,
    ) {
        let Some(key) = key else { return };
        match result {
            Ok(response) => match serde_json::to_value(response) {
                Ok(value) => {
                    if let Err(e) = self.idempotency.store_result(kind, key, &value).await {
                        warn!(kind = %kind, key, error = %e, "cannot store idempotency result");
                    }
                }
                Err(e) => warn!(kind = %kind, key, error = %e, "cannot serialize idempotency result"),
            },
            Err(_) => {
                if let Err(e) = self.idempotency.release(kind, key).await {
                    warn!(kind = %kind, key, error = %e, "cannot release idempotency reservation");
                }
            }
        }
    }
}

fn fingerprint(fields: &[&str]) -> Sha256Digest {
    Sha256Digest::compute(fields.join("\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        assert_ne!(fingerprint(&["a", "b"]), fingerprint(&["b", "a"]));
        assert_eq!(fingerprint(&["a", "b"]), fingerprint(&["a", "b"]));
    }
}
