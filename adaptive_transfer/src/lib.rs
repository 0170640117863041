// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adaptive Transfer
//!
//! Resumable chunked file transfer service. Clients split large files into
//! fixed-size chunks, upload them in any order with strong idempotency
//! guarantees, resume after partial failure, and stream the reconstructed
//! file back with HTTP range support.
//!
//! ## Architecture
//!
//! The crate keeps Clean Architecture layering:
//!
//! - **Application** (`application`) - upload lifecycle orchestration,
//!   download assembly, maintenance
//! - **Infrastructure** (`infrastructure`) - SQLite metadata store,
//!   local/S3 storage, memory/Redis task queues, admission limiters,
//!   worker pool, autoscaler, Prometheus metrics, configuration
//! - **Presentation** (`presentation`) - the `/v1` HTTP surface on axum
//!
//! Domain entities, value objects and ports live in the
//! `adaptive-transfer-domain` crate; process lifecycle (logging, signals,
//! graceful shutdown) in `adaptive-transfer-bootstrap`.
//!
//! ## Execution Pipeline
//!
//! A chunk request passes validation, idempotency reservation, and layered
//! admission (queue slot → global → per-upload → fair-share), then rides
//! the task queue to a worker which writes storage, updates metadata, and
//! signals the waiting request. An autoscaler resizes the worker pool from
//! queue depth and utilization with cooldown and hysteresis.

pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use application::services::{
    ChunkAccepted, CompleteResult, DownloadService, InitUploadRequest, InitUploadResponse, MaintenanceService,
    UploadService, UploadServiceConfig, UploadStatusReport,
};
pub use infrastructure::config::ServiceConfig;
