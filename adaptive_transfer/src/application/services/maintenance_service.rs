// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Maintenance Service
//!
//! Periodic housekeeping, also invokable synchronously through the admin
//! endpoint and the `cleanup` CLI command:
//!
//! (a) uploads stuck in `INITIATED`/`IN_PROGRESS` past the stale TTL are
//!     aborted and their blobs and chunk rows removed (best effort),
//! (b) expired idempotency records are dropped,
//! (c) optionally, blobs referenced by no chunk row are deleted (only on
//!     backends that can enumerate keys).

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use adaptive_transfer_bootstrap::ShutdownToken;
use adaptive_transfer_domain::{IdempotencyStore, StorageBackend, TransferError, UploadStatus, UploadStore};

use crate::application::services::upload_service::UploadService;
use crate::infrastructure::config::CleanupSettings;
use crate::infrastructure::metrics::MetricsService;

const STALE_BATCH: u64 = 100;

/// What one maintenance pass removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub stale_uploads_aborted: u64,
    pub idempotency_records_removed: u64,
    pub orphan_blobs_removed: u64,
}

/// Stale-upload and idempotency GC plus orphan blob removal.
pub struct MaintenanceService {
    store: Arc<dyn UploadStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    storage: Arc<dyn StorageBackend>,
    uploads: Arc<UploadService>,
    metrics: Arc<MetricsService>,
    settings: CleanupSettings,
    stale_upload_ttl_seconds: i64,
}

impl MaintenanceService {
    pub fn new(
        store: Arc<dyn UploadStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        storage: Arc<dyn StorageBackend>,
        uploads: Arc<UploadService>,
        metrics: Arc<MetricsService>,
        settings: CleanupSettings,
        stale_upload_ttl_seconds: i64,
    ) -> Self {
        Self {
            store,
            idempotency,
            storage,
            uploads,
            metrics,
            settings,
            stale_upload_ttl_seconds,
        }
    }

    /// One full maintenance pass.
    pub async fn run_once(&self) -> Result<CleanupReport, TransferError> {
        let mut report = CleanupReport::default();

        report.stale_uploads_aborted = self.reap_stale_uploads().await?;
        report.idempotency_records_removed = self.idempotency.gc(Utc::now()).await?;
        if self.settings.orphan_scan {
            report.orphan_blobs_removed = self.reap_orphan_blobs().await?;
        }

        self.metrics.record_cleanup(
            report.stale_uploads_aborted,
            report.idempotency_records_removed,
            report.orphan_blobs_removed,
        );
        info!(
            stale_uploads = report.stale_uploads_aborted,
            idempotency = report.idempotency_records_removed,
            orphans = report.orphan_blobs_removed,
            "maintenance pass finished"
        );
        Ok(report)
    }

    async fn reap_stale_uploads(&self) -> Result<u64, TransferError> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.stale_upload_ttl_seconds);
        let mut reaped = 0u64;

        loop {
            let stale = self.store.list_stale_uploads(cutoff, STALE_BATCH).await?;
            if stale.is_empty() {
                break;
            }
            for upload in &stale {
                let won = self
                    .store
                    .cas_upload_status(
                        upload.id(),
                        &[UploadStatus::Initiated, UploadStatus::InProgress],
                        UploadStatus::Aborted,
                    )
                    .await?;
                if !won {
                    continue; // completed or aborted while we looked
                }
                self.metrics.record_upload_aborted();
                self.uploads.cleanup_aborted_upload(upload).await;
                reaped += 1;
                info!(upload_id = %upload.id(), updated_at = %upload.updated_at(), "stale upload aborted");
            }
            if (stale.len() as u64) < STALE_BATCH {
                break;
            }
        }
        Ok(reaped)
    }

    async fn reap_orphan_blobs(&self) -> Result<u64, TransferError> {
        let keys = match self.storage.list_keys("").await? {
            Some(keys) => keys,
            None => return Ok(0), // backend cannot enumerate
        };
        let referenced: HashSet<String> = self.store.referenced_storage_keys().await?.into_iter().collect();

        let mut removed = 0u64;
        for key in keys {
            if referenced.contains(&key) {
                continue;
            }
            match self.storage.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key, error = %e, "orphan blob delete failed"),
            }
        }
        Ok(removed)
    }

    /// Tick loop; runs until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownToken) {
        if !self.settings.enabled {
            info!("maintenance disabled by configuration");
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(self.settings.interval_seconds.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_seconds = self.settings.interval_seconds, "maintenance loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            if let Err(e) = self.run_once().await {
                warn!(error = %e, "maintenance pass failed");
            }
        }
        info!("maintenance loop stopped");
    }
}
