// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use crate::application::services::{DownloadService, MaintenanceService, UploadService};
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::RateLimiter;
use crate::presentation::http::auth::Authenticator;

/// Everything the route handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadService>,
    pub downloads: Arc<DownloadService>,
    pub maintenance: Arc<MaintenanceService>,
    pub metrics: Arc<MetricsService>,
    pub authenticator: Arc<Authenticator>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Upper bound for chunk bodies, for the 413 pre-check and the body
    /// limit layer.
    pub max_chunk_size: u64,
}
