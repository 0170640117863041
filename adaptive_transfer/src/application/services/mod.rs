// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Application services orchestrating the domain over the infrastructure
//! adapters.

pub mod download_service;
pub mod maintenance_service;
pub mod upload_service;

pub use download_service::{DownloadService, DownloadStream};
pub use maintenance_service::{CleanupReport, MaintenanceService};
pub use upload_service::{
    ChunkAccepted, CompleteResult, InitUploadRequest, InitUploadResponse, UploadService, UploadServiceConfig,
    UploadStatusReport,
};
