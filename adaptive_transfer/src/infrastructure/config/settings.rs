// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Service Configuration
//!
//! TOML-backed configuration for the transfer service. Every option has a
//! working default so an empty file (or no file) yields a runnable local
//! setup: SQLite next to the process, local-filesystem storage, in-memory
//! queue, api-key auth disabled only if no keys are configured.
//!
//! Precedence: defaults < configuration file < `AT_*` environment
//! variables < command-line overrides (applied by the binary).
//!
//! ## Sections
//!
//! - `[server]` bind address
//! - `[database]` SQLite URL
//! - `[storage]` backend selection (`local` root / `s3` bucket+region)
//! - `[auth]` mode, api-key map, bearer settings, admin set, rate limit
//! - `[upload]` chunk-size bounds, retry cap, stale TTL
//! - `[limits]` inflight caps, queue bound, task wait timeout
//! - `[workers]` + `[autoscale]` pool sizing
//! - `[queue]` backend selection (`memory` / `redis`), staging directory
//! - `[cleanup]` interval and TTLs
//! - `[tracing]` exporter toggle (wiring stays external)
//! - `[logging]` default level

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use adaptive_transfer_domain::{ChunkSize, TransferError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub upload: UploadSettings,
    pub limits: LimitSettings,
    pub workers: WorkerSettings,
    pub autoscale: AutoscaleSettings,
    pub queue: QueueSettings,
    pub cleanup: CleanupSettings,
    pub tracing: TracingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackendKind,
    /// Root directory for the local backend.
    pub root: String,
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    ApiKey,
    Bearer,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub mode: AuthMode,
    /// API key -> principal.
    pub api_keys: BTreeMap<String, String>,
    pub admin_principals: BTreeSet<String>,
    /// Per-principal requests per minute; zero disables rate limiting.
    pub rate_per_minute: u32,
    pub bearer: BearerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BearerSettings {
    pub secret: String,
    /// HS256 / HS384 / HS512.
    pub algorithm: String,
    pub audience: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub default_chunk_size: u64,
    pub max_chunk_size: u64,
    pub max_retries: u32,
    pub stale_upload_ttl_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_global_inflight_chunks: usize,
    pub max_inflight_chunks_per_upload: usize,
    /// Zero selects the automatic value `max(1, worker_count / 2)`.
    pub max_fair_inflight_chunks_per_upload: usize,
    pub task_queue_maxsize: usize,
    pub queue_put_timeout_seconds: u64,
    pub queue_task_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleSettings {
    pub enabled: bool,
    pub min_workers: usize,
    pub max_workers: usize,
    pub cooldown_seconds: u64,
    pub tick_seconds: u64,
    pub scale_up_queue_threshold: u64,
    pub scale_up_utilization: f64,
    pub scale_down_utilization: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub backend: QueueBackendKind,
    pub redis_url: String,
    pub redis_key: String,
    /// Directory where durable-mode chunk bodies are staged.
    pub staging_dir: String,
    pub consumer_poll_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub idempotency_ttl_seconds: i64,
    pub orphan_scan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSettings {
    pub enabled: bool,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://./adaptive_transfer.db".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Local,
            root: "./transfer-data".to_string(),
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            mode: AuthMode::ApiKey,
            api_keys: BTreeMap::new(),
            admin_principals: BTreeSet::new(),
            rate_per_minute: 600,
            bearer: BearerSettings::default(),
        }
    }
}

impl Default for BearerSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: "HS256".to_string(),
            audience: None,
            issuer: None,
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            default_chunk_size: ChunkSize::DEFAULT_BYTES,
            max_chunk_size: ChunkSize::MAX_BYTES,
            max_retries: 3,
            stale_upload_ttl_seconds: 24 * 3600,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_global_inflight_chunks: 64,
            max_inflight_chunks_per_upload: 8,
            max_fair_inflight_chunks_per_upload: 0,
            task_queue_maxsize: 256,
            queue_put_timeout_seconds: 2,
            queue_task_timeout_seconds: 60,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { count: 4 }
    }
}

impl Default for AutoscaleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_workers: 2,
            max_workers: 16,
            cooldown_seconds: 15,
            tick_seconds: 5,
            scale_up_queue_threshold: 32,
            scale_up_utilization: 0.85,
            scale_down_utilization: 0.25,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_key: "adaptive-transfer:chunk-tasks".to_string(),
            staging_dir: "./transfer-staging".to_string(),
            consumer_poll_seconds: 1,
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            idempotency_ttl_seconds: 24 * 3600,
            orphan_scan: false,
        }
    }
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:4317".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            storage: StorageSettings::default(),
            auth: AuthSettings::default(),
            upload: UploadSettings::default(),
            limits: LimitSettings::default(),
            workers: WorkerSettings::default(),
            autoscale: AutoscaleSettings::default(),
            queue: QueueSettings::default(),
            cleanup: CleanupSettings::default(),
            tracing: TracingSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from a TOML file, falling back to defaults when
    /// the file does not exist, then applies `AT_*` environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self, TransferError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = fs::read_to_string(p)
                    .await
                    .map_err(|e| TransferError::validation(format!("cannot read config {}: {}", p.display(), e)))?;
                toml::from_str::<ServiceConfig>(&raw)
                    .map_err(|e| TransferError::validation(format!("invalid config {}: {}", p.display(), e)))?
            }
            Some(p) => {
                warn!(path = %p.display(), "configuration file not found, using defaults");
                ServiceConfig::default()
            }
            None => {
                debug!("no configuration file given, using defaults");
                ServiceConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies the supported `AT_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AT_BIND") {
            self.server.bind = v;
        }
        if let Ok(v) = std::env::var("AT_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("AT_STORAGE_ROOT") {
            self.storage.root = v;
        }
        if let Ok(v) = std::env::var("AT_S3_BUCKET") {
            self.storage.bucket = v;
            self.storage.backend = StorageBackendKind::S3;
        }
        if let Ok(v) = std::env::var("AT_REDIS_URL") {
            self.queue.redis_url = v;
        }
        if let Ok(v) = std::env::var("AT_BEARER_SECRET") {
            self.auth.bearer.secret = v;
        }
        if let Ok(v) = std::env::var("AT_WORKER_COUNT") {
            match v.parse() {
                Ok(n) => self.workers.count = n,
                Err(_) => warn!(value = %v, "ignoring unparsable AT_WORKER_COUNT"),
            }
        }
        if let Ok(v) = std::env::var("AT_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Cross-field validation.
    pub fn validate(&self) -> Result<(), TransferError> {
        ChunkSize::new(self.upload.default_chunk_size)?;
        ChunkSize::new(self.upload.max_chunk_size)?;
        if self.upload.default_chunk_size > self.upload.max_chunk_size {
            return Err(TransferError::validation(
                "upload.default_chunk_size exceeds upload.max_chunk_size",
            ));
        }
        if self.workers.count == 0 {
            return Err(TransferError::validation("workers.count must be at least 1"));
        }
        if self.limits.max_global_inflight_chunks == 0 {
            return Err(TransferError::validation(
                "limits.max_global_inflight_chunks must be at least 1",
            ));
        }
        if self.limits.max_inflight_chunks_per_upload == 0 {
            return Err(TransferError::validation(
                "limits.max_inflight_chunks_per_upload must be at least 1",
            ));
        }
        if self.limits.task_queue_maxsize == 0 {
            return Err(TransferError::validation("limits.task_queue_maxsize must be at least 1"));
        }
        if self.autoscale.enabled {
            if self.autoscale.min_workers == 0 {
                return Err(TransferError::validation("autoscale.min_workers must be at least 1"));
            }
            if self.autoscale.min_workers > self.autoscale.max_workers {
                return Err(TransferError::validation(
                    "autoscale.min_workers exceeds autoscale.max_workers",
                ));
            }
            if !(self.autoscale.scale_down_utilization < self.autoscale.scale_up_utilization) {
                return Err(TransferError::validation(
                    "autoscale.scale_down_utilization must be below scale_up_utilization",
                ));
            }
        }
        if self.storage.backend == StorageBackendKind::S3 && self.storage.bucket.is_empty() {
            return Err(TransferError::validation("storage.bucket required for the s3 backend"));
        }
        match self.auth.mode {
            AuthMode::Bearer | AuthMode::Hybrid if self.auth.bearer.secret.is_empty() => {
                return Err(TransferError::validation(
                    "auth.bearer.secret required for bearer/hybrid auth mode",
                ));
            }
            _ => {}
        }
        match self.auth.bearer.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => {}
            other => {
                return Err(TransferError::validation(format!(
                    "unsupported bearer algorithm '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Resolved fair-share cap: the configured value, or
    /// `max(1, worker_count / 2)` when configured as zero.
    pub fn effective_fair_share(&self, worker_count: usize) -> usize {
        if self.limits.max_fair_inflight_chunks_per_upload > 0 {
            self.limits.max_fair_inflight_chunks_per_upload
        } else {
            (worker_count / 2).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ServiceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [server]
            bind = "0.0.0.0:9000"

            [limits]
            max_global_inflight_chunks = 2

            [auth.api_keys]
            "key-1" = "alice"
        "#;
        let config: ServiceConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.limits.max_global_inflight_chunks, 2);
        assert_eq!(config.auth.api_keys.get("key-1").unwrap(), "alice");
        // untouched sections keep defaults
        assert_eq!(config.workers.count, WorkerSettings::default().count);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = ServiceConfig::default();
        config.workers.count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_s3_without_bucket() {
        let mut config = ServiceConfig::default();
        config.storage.backend = StorageBackendKind::S3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bearer_without_secret() {
        let mut config = ServiceConfig::default();
        config.auth.mode = AuthMode::Bearer;
        assert!(config.validate().is_err());
        config.auth.bearer.secret = "shh".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_fair_share_auto_resolution() {
        let mut config = ServiceConfig::default();
        config.limits.max_fair_inflight_chunks_per_upload = 0;
        assert_eq!(config.effective_fair_share(8), 4);
        assert_eq!(config.effective_fair_share(1), 1);

        config.limits.max_fair_inflight_chunks_per_upload = 3;
        assert_eq!(config.effective_fair_share(8), 3);
    }

    #[test]
    fn test_inverted_hysteresis_rejected() {
        let mut config = ServiceConfig::default();
        config.autoscale.scale_down_utilization = 0.9;
        config.autoscale.scale_up_utilization = 0.5;
        assert!(config.validate().is_err());
    }
}
