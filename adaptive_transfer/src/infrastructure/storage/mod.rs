// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Storage backend adapters: local filesystem and S3-compatible.

pub mod local;
pub mod s3;

use std::sync::Arc;

use adaptive_transfer_domain::{StorageBackend, TransferError};

use crate::infrastructure::config::{StorageBackendKind, StorageSettings};

pub use local::LocalStorage;
pub use s3::S3Storage;

/// Builds the configured storage backend.
pub async fn build_storage(settings: &StorageSettings) -> Result<Arc<dyn StorageBackend>, TransferError> {
    match settings.backend {
        StorageBackendKind::Local => Ok(Arc::new(LocalStorage::new(settings.root.clone()).await?)),
        StorageBackendKind::S3 => Ok(Arc::new(S3Storage::new(settings).await?)),
    }
}
