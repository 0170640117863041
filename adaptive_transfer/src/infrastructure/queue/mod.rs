// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Durable queue adapters: in-memory (direct mode) and Redis (durable mode).

pub mod memory;
pub mod redis;

use std::sync::Arc;

use adaptive_transfer_domain::{DurableQueue, TransferError};

use crate::infrastructure::config::{QueueBackendKind, QueueSettings};

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

/// Builds the configured queue backend with the given bound.
pub async fn build_queue(settings: &QueueSettings, capacity: usize) -> Result<Arc<dyn DurableQueue>, TransferError> {
    match settings.backend {
        QueueBackendKind::Memory => Ok(Arc::new(MemoryQueue::new(capacity))),
        QueueBackendKind::Redis => Ok(Arc::new(
            RedisQueue::connect(&settings.redis_url, &settings.redis_key, capacity).await?,
        )),
    }
}
