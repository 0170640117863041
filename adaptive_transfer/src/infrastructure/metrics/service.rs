// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus registry for the transfer service. Counters, gauges and
//! histograms are updated at the contract points of the pipeline (accept,
//! admission refusal, storage write, terminal outcome, download) and
//! rendered in exposition format for `GET /metrics`.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

use adaptive_transfer_domain::{BackpressureReason, TransferError};

/// Prometheus metrics for the transfer pipeline.
pub struct MetricsService {
    registry: Arc<Registry>,

    // upload lifecycle
    uploads_initiated_total: IntCounter,
    uploads_completed_total: IntCounter,
    uploads_failed_total: IntCounter,
    uploads_aborted_total: IntCounter,

    // chunk pipeline
    chunks_accepted_total: IntCounter,
    chunks_persisted_total: IntCounter,
    chunks_failed_total: IntCounter,
    chunks_duplicate_total: IntCounter,
    chunk_retries_total: IntCounter,
    admission_rejections_total: IntCounterVec,

    // storage
    storage_puts_total: IntCounter,
    storage_put_duration: Histogram,
    chunk_task_duration: Histogram,

    // downloads
    downloads_total: IntCounter,
    download_bytes_total: IntCounter,

    // gauges
    queue_depth: IntGauge,
    workers_total: IntGauge,
    workers_busy: IntGauge,
    global_inflight: IntGauge,

    // maintenance
    cleanup_uploads_reaped_total: IntCounter,
    cleanup_idempotency_reaped_total: IntCounter,
    cleanup_orphan_blobs_total: IntCounter,
}

impl MetricsService {
    pub fn new() -> Result<Self, TransferError> {
        let registry = Registry::new();
        let metrics = |e: prometheus::Error| TransferError::internal(format!("metrics registration failed: {}", e));

        let uploads_initiated_total = IntCounter::with_opts(Opts::new(
            "transfer_uploads_initiated_total",
            "Uploads created by init",
        ))
        .map_err(metrics)?;
        let uploads_completed_total = IntCounter::with_opts(Opts::new(
            "transfer_uploads_completed_total",
            "Uploads that reached COMPLETED",
        ))
        .map_err(metrics)?;
        let uploads_failed_total = IntCounter::with_opts(Opts::new(
            "transfer_uploads_failed_total",
            "Uploads that reached FAILED",
        ))
        .map_err(metrics)?;
        let uploads_aborted_total = IntCounter::with_opts(Opts::new(
            "transfer_uploads_aborted_total",
            "Uploads that reached ABORTED (explicit or stale cleanup)",
        ))
        .map_err(metrics)?;

        let chunks_accepted_total = IntCounter::with_opts(Opts::new(
            "transfer_chunks_accepted_total",
            "Chunk requests admitted into the pipeline",
        ))
        .map_err(metrics)?;
        let chunks_persisted_total = IntCounter::with_opts(Opts::new(
            "transfer_chunks_persisted_total",
            "Chunks that reached UPLOADED",
        ))
        .map_err(metrics)?;
        let chunks_failed_total = IntCounter::with_opts(Opts::new(
            "transfer_chunks_failed_total",
            "Chunks that reached FAILED after retry exhaustion",
        ))
        .map_err(metrics)?;
        let chunks_duplicate_total = IntCounter::with_opts(Opts::new(
            "transfer_chunks_duplicate_total",
            "Duplicate chunk writes short-circuited without a storage write",
        ))
        .map_err(metrics)?;
        let chunk_retries_total = IntCounter::with_opts(Opts::new(
            "transfer_chunk_retries_total",
            "Chunk task re-submissions after transient failures",
        ))
        .map_err(metrics)?;
        let admission_rejections_total = IntCounterVec::new(
            Opts::new(
                "transfer_admission_rejections_total",
                "Admission refusals by refusing limiter",
            ),
            &["reason"],
        )
        .map_err(metrics)?;

        let storage_puts_total = IntCounter::with_opts(Opts::new(
            "transfer_storage_puts_total",
            "Blob/part writes issued to the storage backend",
        ))
        .map_err(metrics)?;
        let storage_put_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_storage_put_duration_seconds",
                "Latency of storage backend writes",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .map_err(metrics)?;
        let chunk_task_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_chunk_task_duration_seconds",
                "Latency of chunk tasks from claim to terminal outcome",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )
        .map_err(metrics)?;

        let downloads_total = IntCounter::with_opts(Opts::new(
            "transfer_downloads_total",
            "Download requests served (full and ranged)",
        ))
        .map_err(metrics)?;
        let download_bytes_total = IntCounter::with_opts(Opts::new(
            "transfer_download_bytes_total",
            "Bytes scheduled for download responses",
        ))
        .map_err(metrics)?;

        let queue_depth = IntGauge::with_opts(Opts::new("transfer_queue_depth", "Waiting chunk tasks")).map_err(metrics)?;
        let workers_total =
            IntGauge::with_opts(Opts::new("transfer_workers_total", "Workers in the pool")).map_err(metrics)?;
        let workers_busy =
            IntGauge::with_opts(Opts::new("transfer_workers_busy", "Workers executing a task")).map_err(metrics)?;
        let global_inflight = IntGauge::with_opts(Opts::new(
            "transfer_global_inflight_chunks",
            "Admitted chunk tasks not yet terminal",
        ))
        .map_err(metrics)?;

        let cleanup_uploads_reaped_total = IntCounter::with_opts(Opts::new(
            "transfer_cleanup_uploads_reaped_total",
            "Stale uploads aborted by maintenance",
        ))
        .map_err(metrics)?;
        let cleanup_idempotency_reaped_total = IntCounter::with_opts(Opts::new(
            "transfer_cleanup_idempotency_reaped_total",
            "Expired idempotency records removed by maintenance",
        ))
        .map_err(metrics)?;
        let cleanup_orphan_blobs_total = IntCounter::with_opts(Opts::new(
            "transfer_cleanup_orphan_blobs_total",
            "Orphan blobs removed by maintenance",
        ))
        .map_err(metrics)?;

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(uploads_initiated_total.clone()),
            Box::new(uploads_completed_total.clone()),
            Box::new(uploads_failed_total.clone()),
            Box::new(uploads_aborted_total.clone()),
            Box::new(chunks_accepted_total.clone()),
            Box::new(chunks_persisted_total.clone()),
            Box::new(chunks_failed_total.clone()),
            Box::new(chunks_duplicate_total.clone()),
            Box::new(chunk_retries_total.clone()),
            Box::new(admission_rejections_total.clone()),
            Box::new(storage_puts_total.clone()),
            Box::new(storage_put_duration.clone()),
            Box::new(chunk_task_duration.clone()),
            Box::new(downloads_total.clone()),
            Box::new(download_bytes_total.clone()),
            Box::new(queue_depth.clone()),
            Box::new(workers_total.clone()),
            Box::new(workers_busy.clone()),
            Box::new(global_inflight.clone()),
            Box::new(cleanup_uploads_reaped_total.clone()),
            Box::new(cleanup_idempotency_reaped_total.clone()),
            Box::new(cleanup_orphan_blobs_total.clone()),
        ];
        for collector in collectors {
            registry.register(collector).map_err(metrics)?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            uploads_initiated_total,
            uploads_completed_total,
            uploads_failed_total,
            uploads_aborted_total,
            chunks_accepted_total,
            chunks_persisted_total,
            chunks_failed_total,
            chunks_duplicate_total,
            chunk_retries_total,
            admission_rejections_total,
            storage_puts_total,
            storage_put_duration,
            chunk_task_duration,
            downloads_total,
            download_bytes_total,
            queue_depth,
            workers_total,
            workers_busy,
            global_inflight,
            cleanup_uploads_reaped_total,
            cleanup_idempotency_reaped_total,
            cleanup_orphan_blobs_total,
        })
    }

    // upload lifecycle

    pub fn record_upload_initiated(&self) {
        self.uploads_initiated_total.inc();
    }

    pub fn record_upload_completed(&self) {
        self.uploads_completed_total.inc();
    }

    pub fn record_upload_failed(&self) {
        self.uploads_failed_total.inc();
    }

    pub fn record_upload_aborted(&self) {
        self.uploads_aborted_total.inc();
    }

    // chunk pipeline

    pub fn record_chunk_accepted(&self) {
        self.chunks_accepted_total.inc();
    }

    pub fn record_chunk_persisted(&self) {
        self.chunks_persisted_total.inc();
    }

    pub fn record_chunk_failed(&self) {
        self.chunks_failed_total.inc();
    }

    pub fn record_chunk_duplicate(&self) {
        self.chunks_duplicate_total.inc();
    }

    pub fn record_chunk_retry(&self) {
        self.chunk_retries_total.inc();
    }

    pub fn record_admission_rejection(&self, reason: BackpressureReason) {
        self.admission_rejections_total.with_label_values(&[reason.as_str()]).inc();
    }

    // storage

    pub fn record_storage_put(&self, duration: Duration) {
        self.storage_puts_total.inc();
        self.storage_put_duration.observe(duration.as_secs_f64());
    }

    pub fn storage_puts(&self) -> u64 {
        self.storage_puts_total.get()
    }

    pub fn record_chunk_task_duration(&self, duration: Duration) {
        self.chunk_task_duration.observe(duration.as_secs_f64());
    }

    // downloads

    pub fn record_download(&self, bytes: u64) {
        self.downloads_total.inc();
        self.download_bytes_total.inc_by(bytes);
    }

    // gauges

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.set(depth as i64);
    }

    pub fn set_workers(&self, total: usize, busy: usize) {
        self.workers_total.set(total as i64);
        self.workers_busy.set(busy as i64);
    }

    pub fn set_global_inflight(&self, inflight: usize) {
        self.global_inflight.set(inflight as i64);
    }

    // maintenance

    pub fn record_cleanup(&self, uploads_reaped: u64, idempotency_reaped: u64, orphan_blobs: u64) {
        self.cleanup_uploads_reaped_total.inc_by(uploads_reaped);
        self.cleanup_idempotency_reaped_total.inc_by(idempotency_reaped);
        self.cleanup_orphan_blobs_total.inc_by(orphan_blobs);
    }

    /// Renders the registry in Prometheus exposition format.
    pub fn get_metrics(&self) -> Result<String, TransferError> {
        let encoder = prometheus::TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(|e| TransferError::internal(format!("metrics encoding failed: {}", e)))
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}
