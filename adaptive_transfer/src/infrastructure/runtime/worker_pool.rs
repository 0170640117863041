// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool and Chunk Executor
//!
//! The executor runs one chunk task to a terminal state:
//!
//! 1. claim the chunk row (`UPLOADING` via CAS from absent/PENDING/FAILED)
//! 2. verify the body digest (and the client-declared checksum)
//! 3. write to the storage backend (`put`, or `put_part` under multipart)
//! 4. mark the row `UPLOADED` and report success
//! 5. on a retryable failure below the retry cap: flip the row back to
//!    `FAILED`, bump `retry_count`, re-submit
//! 6. on permanent failure or retry exhaustion: leave the row `FAILED` and
//!    report the error - the upload itself stays open so the client can
//!    resume
//!
//! The pool runs N workers against the task queue; both execution modes
//! (in-memory queue and external queue consumers) share this exact path.
//! The pool resizes between bounds on command from the autoscaler:
//! growth spawns workers, shrinking retires idle workers only - an admitted
//! storage write is never cancelled.

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use adaptive_transfer_bootstrap::{ShutdownCoordinator, ShutdownToken};
use adaptive_transfer_domain::{
    ChunkClaim, ChunkTask, DurableQueue, Sha256Digest, StorageBackend, TransferError, UploadStore,
};

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::completion::{ChunkOutcome, CompletionRegistry};
use crate::infrastructure::runtime::limiters::AdmissionController;

const DEQUEUE_POLL: Duration = Duration::from_secs(1);

/// Terminal classification of one execution attempt.
#[derive(Debug)]
pub enum ExecutionVerdict {
    /// The chunk is persisted (or was already); ack and report success.
    Done(ChunkOutcome),
    /// Transient failure with retry budget left; `retry_count` was bumped
    /// and the task should be re-submitted.
    Retry,
    /// Terminal failure; the chunk row is `FAILED` and the waiter gets the
    /// error.
    Failed(TransferError),
}

/// Executes chunk tasks against the metadata store and storage backend.
pub struct ChunkExecutor {
    store: Arc<dyn UploadStore>,
    storage: Arc<dyn StorageBackend>,
    metrics: Arc<MetricsService>,
    max_retries: u32,
}

impl ChunkExecutor {
    pub fn new(
        store: Arc<dyn UploadStore>,
        storage: Arc<dyn StorageBackend>,
        metrics: Arc<MetricsService>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            storage,
            metrics,
            max_retries,
        }
    }

    /// Runs one attempt of the task. On `Retry` the caller re-submits the
    /// (mutated) task; on anything else the task is terminal.
    pub async fn execute(&self, task: &mut ChunkTask) -> ExecutionVerdict {
        let body = match self.load_body(task).await {
            Ok(body) => body,
            Err(e) => return ExecutionVerdict::Failed(e),
        };

        match self
            .store
            .claim_chunk(task.upload_id, task.chunk_index, &task.storage_key, task.retry_count)
            .await
        {
            Ok(ChunkClaim::Claimed) => {}
            Ok(ChunkClaim::AlreadyUploaded { checksum }) => {
                // The first successful writer won; identical bodies
                // short-circuit without touching storage.
                return match checksum {
                    Some(stored) if stored != task.body_digest => ExecutionVerdict::Failed(TransferError::conflict(
                        format!("chunk {} already uploaded with different content", task.chunk_index),
                    )),
                    _ => {
                        self.metrics.record_chunk_duplicate();
                        self.cleanup_staging(task).await;
                        ExecutionVerdict::Done(ChunkOutcome {
                            chunk_index: task.chunk_index,
                            duplicate: true,
                        })
                    }
                };
            }
            Ok(ChunkClaim::InFlight) => {
                // Another task holds the row; back off through the retry
                // budget until it terminates.
                return self.retry_or_fail(
                    task,
                    TransferError::conflict(format!("chunk {} write already in flight", task.chunk_index)),
                    true,
                );
            }
            Err(e) => return self.retry_or_fail(task, e, false),
        }

        let digest = Sha256Digest::compute(&body);
        if digest != task.body_digest {
            self.fail_row(task).await;
            self.cleanup_staging(task).await;
            return ExecutionVerdict::Failed(TransferError::checksum(format!(
                "chunk {} body changed between acceptance and execution",
                task.chunk_index
            )));
        }
        if let Some(expected) = &task.expected_checksum {
            if *expected != digest {
                self.fail_row(task).await;
                self.cleanup_staging(task).await;
                return ExecutionVerdict::Failed(TransferError::checksum(format!(
                    "chunk {} does not match its declared checksum",
                    task.chunk_index
                )));
            }
        }

        let started = Instant::now();
        let write_result = match &task.multipart_handle {
            Some(handle) => self
                .storage
                .put_part(handle, &task.multipart_object_key(), task.part_number(), body.clone())
                .await
                .map(Some),
            None => self.storage.put(&task.storage_key, body.clone()).await,
        };

        let etag = match write_result {
            Ok(etag) => {
                self.metrics.record_storage_put(started.elapsed());
                etag
            }
            Err(e) => {
                self.fail_row(task).await;
                return self.retry_or_fail(task, e, false);
            }
        };

        if let Err(e) = self
            .store
            .finish_chunk(
                task.upload_id,
                task.chunk_index,
                body.len() as u64,
                Some(&digest),
                etag.as_deref(),
            )
            .await
        {
            // Leave the row re-claimable rather than stuck in UPLOADING.
            self.fail_row(task).await;
            return self.retry_or_fail(task, e, false);
        }

        self.metrics.record_chunk_persisted();
        self.cleanup_staging(task).await;
        debug!(
            upload_id = %task.upload_id,
            chunk_index = task.chunk_index,
            bytes = body.len(),
            "chunk persisted"
        );
        ExecutionVerdict::Done(ChunkOutcome {
            chunk_index: task.chunk_index,
            duplicate: false,
        })
    }

    /// Marks the task terminally failed outside `execute` (queue
    /// re-submission failed).
    pub async fn abandon(&self, task: &ChunkTask) {
        self.fail_row(task).await;
        self.cleanup_staging(task).await;
        self.metrics.record_chunk_failed();
    }

    async fn load_body(&self, task: &ChunkTask) -> Result<Bytes, TransferError> {
        if !task.bytes.is_empty() {
            return Ok(task.bytes.clone());
        }
        match &task.staging_path {
            Some(path) => match tokio::fs::read(path).await {
                Ok(raw) => Ok(Bytes::from(raw)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TransferError::permanent_storage(format!(
                    "staged body for task {} is gone",
                    task.task_id
                ))),
                Err(e) => Err(e.into()),
            },
            None => Err(TransferError::internal(format!(
                "task {} carries neither bytes nor a staging path",
                task.task_id
            ))),
        }
    }

    fn retry_or_fail(&self, task: &mut ChunkTask, error: TransferError, force_retryable: bool) -> ExecutionVerdict {
        let retryable = force_retryable || error.is_retryable();
        if retryable && task.retry_count < self.max_retries {
            task.retry_count += 1;
            self.metrics.record_chunk_retry();
            debug!(
                upload_id = %task.upload_id,
                chunk_index = task.chunk_index,
                retry_count = task.retry_count,
                error = %error,
                "re-submitting chunk task"
            );
            ExecutionVerdict::Retry
        } else {
            self.metrics.record_chunk_failed();
            warn!(
                upload_id = %task.upload_id,
                chunk_index = task.chunk_index,
                retry_count = task.retry_count,
                error = %error,
                "chunk task failed terminally"
            );
            ExecutionVerdict::Failed(error)
        }
    }

    async fn fail_row(&self, task: &ChunkTask) {
        if let Err(e) = self
            .store
            .fail_chunk(task.upload_id, task.chunk_index, task.retry_count)
            .await
        {
            error!(upload_id = %task.upload_id, chunk_index = task.chunk_index, error = %e, "cannot mark chunk FAILED");
        }
    }

    async fn cleanup_staging(&self, task: &ChunkTask) {
        if let Some(path) = &task.staging_path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path, error = %e, "cannot remove staged chunk body");
                }
            }
        }
    }
}

/// Resizable pool of executors consuming the task queue.
pub struct WorkerPool {
    queue: Arc<dyn DurableQueue>,
    executor: Arc<ChunkExecutor>,
    registry: Arc<CompletionRegistry>,
    admission: Arc<AdmissionController>,
    metrics: Arc<MetricsService>,
    coordinator: Arc<ShutdownCoordinator>,
    shutdown: ShutdownToken,

    target: watch::Sender<usize>,
    alive: AtomicUsize,
    busy: AtomicUsize,
    worker_seq: AtomicUsize,
    /// Whether the fair-share cap follows the worker count.
    fair_share_auto: bool,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        executor: Arc<ChunkExecutor>,
        registry: Arc<CompletionRegistry>,
        admission: Arc<AdmissionController>,
        metrics: Arc<MetricsService>,
        coordinator: Arc<ShutdownCoordinator>,
        initial_workers: usize,
        fair_share_auto: bool,
    ) -> Arc<Self> {
        let initial = initial_workers.max(1);
        let (target, _) = watch::channel(initial);
        let shutdown = coordinator.token();
        Arc::new(Self {
            queue,
            executor,
            registry,
            admission,
            metrics,
            coordinator,
            shutdown,
            target,
            alive: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
            worker_seq: AtomicUsize::new(0),
            fair_share_auto,
        })
    }

    /// Spawns the initial workers.
    pub fn start(self: &Arc<Self>) {
        let target = *self.target.borrow();
        self.apply_fair_share(target);
        self.spawn_to_target(target);
        info!(workers = target, queue = self.queue.kind(), "worker pool started");
    }

    /// Applies a new worker count. Growth spawns immediately; shrinking
    /// retires workers as they go idle.
    pub fn resize(self: &Arc<Self>, new_target: usize) {
        let new_target = new_target.max(1);
        let old = self.target.send_replace(new_target);
        if old != new_target {
            info!(from = old, to = new_target, "resizing worker pool");
        }
        self.apply_fair_share(new_target);
        self.spawn_to_target(new_target);
        self.publish_gauges();
    }

    pub fn worker_count(&self) -> usize {
        self.alive.load(Ordering::Acquire)
    }

    pub fn busy_count(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    pub fn target(&self) -> usize {
        *self.target.borrow()
    }

    fn apply_fair_share(&self, worker_count: usize) {
        if self.fair_share_auto {
            self.admission.set_fair_share_cap((worker_count / 2).max(1));
        }
    }

    fn spawn_to_target(self: &Arc<Self>, target: usize) {
        while self.alive.load(Ordering::Acquire) < target {
            self.alive.fetch_add(1, Ordering::AcqRel);
            let worker_id = self.worker_seq.fetch_add(1, Ordering::AcqRel);
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.worker_loop(worker_id).await;
            });
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        let _drain = self.coordinator.register_drain();
        debug!(worker_id, "worker started");
        let mut retired_by_cas = false;

        loop {
            if self.shutdown.is_shutting_down() {
                break;
            }

            // Idle retirement keeps alive <= target without cancelling
            // in-flight work.
            let target = *self.target.borrow();
            let alive = self.alive.load(Ordering::Acquire);
            if alive > target {
                if self
                    .alive
                    .compare_exchange(alive, alive - 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    retired_by_cas = true;
                    break;
                }
                continue;
            }

            // No select against the shutdown token here: a completed
            // dequeue must not be dropped with its task. The poll interval
            // bounds shutdown latency instead.
            match self.queue.dequeue(DEQUEUE_POLL).await {
                Ok(Some(task)) => self.process(task).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(worker_id, error = %e, "dequeue failed");
                    tokio::time::sleep(DEQUEUE_POLL).await;
                }
            }
        }

        if !retired_by_cas {
            self.alive.fetch_sub(1, Ordering::AcqRel);
        }
        self.publish_gauges();
        debug!(worker_id, "worker stopped");
    }

    async fn process(&self, mut task: ChunkTask) {
        self.registry.on_dequeued(&task.task_id);
        self.busy.fetch_add(1, Ordering::AcqRel);
        self.publish_gauges();
        let started = Instant::now();

        let verdict = self.executor.execute(&mut task).await;
        match verdict {
            ExecutionVerdict::Done(outcome) => {
                if let Err(e) = self.queue.ack(&task).await {
                    warn!(task_id = %task.task_id, error = %e, "ack failed");
                }
                self.registry.complete(&task.task_id, Ok(outcome));
            }
            ExecutionVerdict::Retry => {
                if let Err(e) = self.queue.nack(&task, true).await {
                    // Cannot re-submit: the task is terminal after all.
                    warn!(task_id = %task.task_id, error = %e, "re-submission failed, failing chunk");
                    self.executor.abandon(&task).await;
                    self.registry.complete(&task.task_id, Err(e));
                }
            }
            ExecutionVerdict::Failed(error) => {
                if let Err(e) = self.queue.ack(&task).await {
                    warn!(task_id = %task.task_id, error = %e, "ack of failed task failed");
                }
                self.registry.complete(&task.task_id, Err(error));
            }
        }

        self.metrics.record_chunk_task_duration(started.elapsed());
        self.busy.fetch_sub(1, Ordering::AcqRel);
        self.publish_gauges();
    }

    fn publish_gauges(&self) {
        self.metrics
            .set_workers(self.alive.load(Ordering::Acquire), self.busy.load(Ordering::Acquire));
        self.metrics.set_global_inflight(self.admission.global_in_use());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queue::MemoryQueue;
    use crate::infrastructure::repositories::{schema, SqliteUploadStore};
    use crate::infrastructure::storage::LocalStorage;
    use adaptive_transfer_domain::{ChunkRecord, ChunkSize, ChunkStatus, Upload};
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashMap;

    /// Storage that fails a configurable number of puts before succeeding.
    struct FlakyStorage {
        blobs: PlMutex<HashMap<String, Bytes>>,
        failures_left: AtomicUsize,
    }

    impl FlakyStorage {
        fn new(failures: usize) -> Self {
            Self {
                blobs: PlMutex::new(HashMap::new()),
                failures_left: AtomicUsize::new(failures),
            }
        }

        fn blob_count(&self) -> usize {
            self.blobs.lock().len()
        }
    }

    #[async_trait]
    impl StorageBackend for FlakyStorage {
        fn kind(&self) -> &'static str {
            "flaky"
        }

        async fn put(&self, key: &str, data: Bytes) -> Result<Option<String>, TransferError> {
            let left = self.failures_left.load(Ordering::Acquire);
            if left > 0 {
                self.failures_left.fetch_sub(1, Ordering::AcqRel);
                return Err(TransferError::transient_storage("induced failure"));
            }
            self.blobs.lock().insert(key.to_string(), data);
            Ok(None)
        }

        async fn get(
            &self,
            key: &str,
            _offset: u64,
            _length: Option<u64>,
        ) -> Result<adaptive_transfer_domain::ByteStream, TransferError> {
            let data = self
                .blobs
                .lock()
                .get(key)
                .cloned()
                .ok_or_else(|| TransferError::permanent_storage("missing"))?;
            Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
        }

        async fn delete(&self, key: &str) -> Result<(), TransferError> {
            self.blobs.lock().remove(key);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<SqliteUploadStore>,
        queue: Arc<MemoryQueue>,
        registry: Arc<CompletionRegistry>,
        admission: Arc<AdmissionController>,
        pool: Arc<WorkerPool>,
        metrics: Arc<MetricsService>,
    }

    async fn harness(storage: Arc<dyn StorageBackend>, max_retries: u32) -> Harness {
        let store = Arc::new(SqliteUploadStore::new(schema::in_memory_pool().await.unwrap()));
        let queue = Arc::new(MemoryQueue::new(32));
        let registry = Arc::new(CompletionRegistry::new());
        let admission = AdmissionController::new(32, 16, 8, 8);
        let metrics = Arc::new(MetricsService::new().unwrap());
        let executor = Arc::new(ChunkExecutor::new(
            store.clone() as Arc<dyn UploadStore>,
            storage,
            metrics.clone(),
            max_retries,
        ));
        let coordinator = Arc::new(ShutdownCoordinator::default());
        let pool = WorkerPool::new(
            queue.clone() as Arc<dyn DurableQueue>,
            executor,
            registry.clone(),
            admission.clone(),
            metrics.clone(),
            coordinator,
            2,
            false,
        );
        pool.start();
        Harness {
            store,
            queue,
            registry,
            admission,
            pool,
            metrics,
        }
    }

    async fn submit(h: &Harness, upload: &Upload, index: u64, body: &'static [u8]) -> super::super::completion::TaskResult {
        let task_id = format!("task-{}-{}", upload.id(), index);
        let permit = h
            .admission
            .admit(upload.id(), Duration::from_millis(200))
            .await
            .unwrap();
        let rx = h.registry.register(&task_id, permit);
        let task = ChunkTask {
            task_id,
            upload_id: upload.id(),
            chunk_index: index,
            storage_key: ChunkRecord::storage_key_for(upload.id(), index),
            multipart_handle: None,
            expected_checksum: None,
            body_digest: Sha256Digest::compute(body),
            retry_count: 0,
            staging_path: None,
            bytes: Bytes::from_static(body),
            delivery_token: None,
        };
        h.queue.enqueue(task, Duration::from_millis(200)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap()
    }

    async fn seeded_upload(h: &Harness) -> Upload {
        let upload = Upload::new("alice", "f.bin", 10, ChunkSize::new(4).unwrap(), None).unwrap();
        h.store.insert_upload(&upload).await.unwrap();
        upload
    }

    #[tokio::test]
    async fn test_task_persists_chunk() {
        let storage = Arc::new(FlakyStorage::new(0));
        let h = harness(storage.clone(), 3).await;
        let upload = seeded_upload(&h).await;

        let outcome = submit(&h, &upload, 0, b"0123").await.unwrap();
        assert!(!outcome.duplicate);

        let chunks = h.store.uploaded_chunks(upload.id()).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].status, ChunkStatus::Uploaded);
        assert_eq!(chunks[0].size_bytes, 4);
        assert_eq!(storage.blob_count(), 1);
        // terminal outcome released the inflight tokens
        assert_eq!(h.admission.global_in_use(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_to_success() {
        let storage = Arc::new(FlakyStorage::new(2));
        let h = harness(storage.clone(), 3).await;
        let upload = seeded_upload(&h).await;

        let outcome = submit(&h, &upload, 0, b"0123").await.unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(storage.blob_count(), 1);
        assert_eq!(h.metrics.storage_puts(), 1); // only the success is counted
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails_chunk_not_upload() {
        let storage = Arc::new(FlakyStorage::new(100));
        let h = harness(storage.clone(), 2).await;
        let upload = seeded_upload(&h).await;

        let err = submit(&h, &upload, 0, b"0123").await.unwrap_err();
        assert!(matches!(err, TransferError::TransientStorage(_)));

        // the chunk row is FAILED and re-claimable; the upload stays open
        let chunks = h.store.all_chunks(upload.id()).await.unwrap();
        assert_eq!(chunks[0].status, ChunkStatus::Failed);
        let stored = h.store.find_upload(upload.id()).await.unwrap().unwrap();
        assert!(!stored.is_terminal());
        assert_eq!(h.admission.global_in_use(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_body_short_circuits_storage() {
        let storage = Arc::new(FlakyStorage::new(0));
        let h = harness(storage.clone(), 3).await;
        let upload = seeded_upload(&h).await;

        submit(&h, &upload, 1, b"4567").await.unwrap();
        let puts_after_first = h.metrics.storage_puts();

        let outcome = submit(&h, &upload, 1, b"4567").await.unwrap();
        assert!(outcome.duplicate);
        assert_eq!(h.metrics.storage_puts(), puts_after_first); // no second write
    }

    #[tokio::test]
    async fn test_duplicate_with_different_body_conflicts() {
        let storage = Arc::new(FlakyStorage::new(0));
        let h = harness(storage, 3).await;
        let upload = seeded_upload(&h).await;

        submit(&h, &upload, 1, b"4567").await.unwrap();
        let err = submit(&h, &upload, 1, b"9999").await.unwrap_err();
        assert!(matches!(err, TransferError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_declared_checksum_mismatch_fails() {
        let storage = Arc::new(FlakyStorage::new(0));
        let h = harness(storage.clone(), 3).await;
        let upload = seeded_upload(&h).await;

        let task_id = "task-bad-checksum".to_string();
        let permit = h.admission.admit(upload.id(), Duration::from_millis(200)).await.unwrap();
        let rx = h.registry.register(&task_id, permit);
        let task = ChunkTask {
            task_id,
            upload_id: upload.id(),
            chunk_index: 0,
            storage_key: ChunkRecord::storage_key_for(upload.id(), 0),
            multipart_handle: None,
            expected_checksum: Some(Sha256Digest::compute(b"something-else")),
            body_digest: Sha256Digest::compute(b"0123"),
            retry_count: 0,
            staging_path: None,
            bytes: Bytes::from_static(b"0123"),
            delivery_token: None,
        };
        h.queue.enqueue(task, Duration::from_millis(200)).await.unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, TransferError::Checksum(_)));
        assert_eq!(storage.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_pool_resize_and_idle_retirement() {
        let storage = Arc::new(FlakyStorage::new(0));
        let h = harness(storage, 3).await;

        assert_eq!(h.pool.worker_count(), 2);
        h.pool.resize(4);
        assert_eq!(h.pool.worker_count(), 4);

        h.pool.resize(1);
        // retirement happens as workers pass through their idle check
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.pool.worker_count() > 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("workers must retire to the new target");
        assert_eq!(h.pool.worker_count(), 1);

        // the survivor still processes tasks
        let upload = seeded_upload(&h).await;
        submit(&h, &upload, 0, b"0123").await.unwrap();
    }

    #[tokio::test]
    async fn test_staged_body_execution() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("task-body");
        tokio::fs::write(&staged, b"0123").await.unwrap();

        let storage = Arc::new(FlakyStorage::new(0));
        let h = harness(storage.clone(), 3).await;
        let upload = seeded_upload(&h).await;

        let task_id = "task-staged".to_string();
        let permit = h.admission.admit(upload.id(), Duration::from_millis(200)).await.unwrap();
        let rx = h.registry.register(&task_id, permit);
        let task = ChunkTask {
            task_id,
            upload_id: upload.id(),
            chunk_index: 0,
            storage_key: ChunkRecord::storage_key_for(upload.id(), 0),
            multipart_handle: None,
            expected_checksum: None,
            body_digest: Sha256Digest::compute(b"0123"),
            retry_count: 0,
            staging_path: Some(staged.to_string_lossy().into_owned()),
            bytes: Bytes::new(),
            delivery_token: None,
        };
        h.queue.enqueue(task, Duration::from_millis(200)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap().unwrap();
        assert_eq!(storage.blob_count(), 1);
        // the staged body is cleaned up after the terminal outcome
        assert!(!staged.exists());
    }

    // Keep LocalStorage exercised against the executor as well.
    #[tokio::test]
    async fn test_executor_with_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let h = harness(storage, 3).await;
        let upload = seeded_upload(&h).await;

        submit(&h, &upload, 0, b"0123").await.unwrap();
        submit(&h, &upload, 1, b"4567").await.unwrap();
        submit(&h, &upload, 2, b"89").await.unwrap();

        assert!(h.store.missing_chunk_indices(upload.id(), 3).await.unwrap().is_empty());
    }
}
