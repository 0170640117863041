// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Durable Queue Port
//!
//! Enqueue/dequeue/ack of chunk-write tasks. Two variants ship: a bounded
//! in-process FIFO (direct mode) and a Redis list (durable mode) whose
//! ack/nack uses a processing list for redelivery safety. Consumers run the
//! same executor logic in both modes.
//!
//! ## Contract
//!
//! - `enqueue` is durable when the variant is external
//! - `dequeue` returns the next task, or `None` once the timeout elapses
//! - `ack` marks terminal success; `nack(retry=true)` releases the delivery
//!   for redelivery, `nack(retry=false)` discards it
//! - the in-process variant collapses ack/nack to local disposal

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TransferError;
use crate::value_objects::{Sha256Digest, UploadId};

/// One chunk-write task flowing through the execution pipeline.
///
/// Direct mode carries the body in `bytes` (never serialized); durable mode
/// stages the body to `staging_path` synchronously in the accepting request
/// and ships only the reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTask {
    /// Unique task id; also the key of the completion signal the API layer
    /// awaits.
    pub task_id: String,
    pub upload_id: UploadId,
    pub chunk_index: u64,
    /// Blob key the executor writes (`<upload_id>/<chunk_index>`).
    pub storage_key: String,
    /// Multipart handle when the upload runs as one multipart object; the
    /// part number is `chunk_index + 1`.
    pub multipart_handle: Option<String>,
    /// Client-declared chunk checksum, verified before the storage write.
    pub expected_checksum: Option<Sha256Digest>,
    /// Digest of the accepted body, recorded on the chunk row.
    pub body_digest: Sha256Digest,
    pub retry_count: u32,
    /// Staged body location (durable mode).
    pub staging_path: Option<String>,

    /// In-memory body (direct mode only).
    #[serde(skip)]
    pub bytes: Bytes,

    /// Raw payload as delivered by an external queue, used to acknowledge
    /// exactly the delivered entry.
    #[serde(skip)]
    pub delivery_token: Option<String>,
}

impl ChunkTask {
    /// Key of the final whole-file object when multipart is active.
    pub fn multipart_object_key(&self) -> String {
        self.upload_id.to_string()
    }

    /// Part number for the multipart primitive set (1-based).
    pub fn part_number(&self) -> u32 {
        (self.chunk_index + 1) as u32
    }
}

/// Chunk-task transport between acceptance and execution.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Queue variant name used in logs and metric labels.
    fn kind(&self) -> &'static str;

    /// Adds a task, waiting up to `timeout` for a free slot. Refusal after
    /// the timeout is `Backpressure(QueueFull)`.
    async fn enqueue(&self, task: ChunkTask, timeout: Duration) -> Result<(), TransferError>;

    /// Takes the next task, waiting up to `timeout` when the queue is empty.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<ChunkTask>, TransferError>;

    /// Acknowledges terminal handling of a delivered task.
    async fn ack(&self, task: &ChunkTask) -> Result<(), TransferError>;

    /// Releases a delivered task; with `retry` it becomes eligible for
    /// redelivery, otherwise it is discarded.
    async fn nack(&self, task: &ChunkTask, retry: bool) -> Result<(), TransferError>;

    /// Current number of waiting tasks, for the autoscaler and metrics.
    async fn depth(&self) -> Result<u64, TransferError>;
}
