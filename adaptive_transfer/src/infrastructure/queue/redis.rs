// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Redis List Queue
//!
//! Durable-mode `DurableQueue` over a Redis list. Deliveries move from the
//! main list to a processing list (`RPOPLPUSH`), so an entry stays visible
//! in Redis until the consumer acks (`LREM` from processing) or nacks
//! (re-push to main). Chunk bodies never travel through Redis: the
//! accepting request stages them to disk and the task carries the path.
//!
//! The shared multiplexed connection rules out blocking pops; `dequeue`
//! polls with a short sleep until its timeout elapses.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use adaptive_transfer_domain::{BackpressureReason, ChunkTask, DurableQueue, TransferError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Redis-backed chunk-task queue.
pub struct RedisQueue {
    conn: ConnectionManager,
    main_key: String,
    processing_key: String,
    capacity: usize,
}

impl RedisQueue {
    /// Connects to Redis and prepares the queue keys.
    pub async fn connect(url: &str, key: &str, capacity: usize) -> Result<Self, TransferError> {
        let client = redis::Client::open(url)
            .map_err(|e| TransferError::internal(format!("invalid redis url: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| TransferError::internal(format!("cannot connect to redis: {}", e)))?;
        Ok(Self {
            conn,
            main_key: key.to_string(),
            processing_key: format!("{}:processing", key),
            capacity: capacity.max(1),
        })
    }

    fn redis_err(context: &str, e: redis::RedisError) -> TransferError {
        TransferError::transient_storage(format!("redis {}: {}", context, e))
    }

    fn encode(task: &ChunkTask) -> Result<String, TransferError> {
        serde_json::to_string(task).map_err(TransferError::from)
    }

    fn decode(raw: &str) -> Result<ChunkTask, TransferError> {
        let mut task: ChunkTask = serde_json::from_str(raw)?;
        task.delivery_token = Some(raw.to_string());
        Ok(task)
    }
}

#[async_trait]
impl DurableQueue for RedisQueue {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn enqueue(&self, task: ChunkTask, timeout: Duration) -> Result<(), TransferError> {
        let payload = Self::encode(&task)?;
        let deadline = Instant::now() + timeout;
        let mut conn = self.conn.clone();

        loop {
            let depth: u64 = conn.llen(&self.main_key).await.map_err(|e| Self::redis_err("llen", e))?;
            if (depth as usize) < self.capacity {
                let _: () = conn
                    .lpush(&self.main_key, &payload)
                    .await
                    .map_err(|e| Self::redis_err("lpush", e))?;
                return Ok(());
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(TransferError::Backpressure(BackpressureReason::QueueFull));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ChunkTask>, TransferError> {
        let deadline = Instant::now() + timeout;
        let mut conn = self.conn.clone();

        loop {
            let raw: Option<String> = conn
                .rpoplpush(&self.main_key, &self.processing_key)
                .await
                .map_err(|e| Self::redis_err("rpoplpush", e))?;
            if let Some(raw) = raw {
                return Ok(Some(Self::decode(&raw)?));
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&self, task: &ChunkTask) -> Result<(), TransferError> {
        let Some(token) = &task.delivery_token else {
            warn!(task_id = %task.task_id, "ack without delivery token");
            return Ok(());
        };
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .lrem(&self.processing_key, 1, token)
            .await
            .map_err(|e| Self::redis_err("lrem", e))?;
        Ok(())
    }

    async fn nack(&self, task: &ChunkTask, retry: bool) -> Result<(), TransferError> {
        let mut conn = self.conn.clone();

        if let Some(token) = &task.delivery_token {
            let _: i64 = conn
                .lrem(&self.processing_key, 1, token)
                .await
                .map_err(|e| Self::redis_err("lrem", e))?;
        }

        if retry {
            // Re-deliver with the caller's updated retry count.
            let payload = Self::encode(task)?;
            let _: () = conn
                .lpush(&self.main_key, &payload)
                .await
                .map_err(|e| Self::redis_err("lpush", e))?;
        }
        Ok(())
    }

    async fn depth(&self) -> Result<u64, TransferError> {
        let mut conn = self.conn.clone();
        conn.llen(&self.main_key).await.map_err(|e| Self::redis_err("llen", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_transfer_domain::{Sha256Digest, UploadId};
    use bytes::Bytes;

    // Connection-level behavior needs a live Redis; encoding is covered
    // here.
    #[test]
    fn test_task_round_trip_keeps_reference_fields() {
        let upload_id = UploadId::new();
        let task = ChunkTask {
            task_id: "t-1".into(),
            upload_id,
            chunk_index: 2,
            storage_key: format!("{}/2", upload_id),
            multipart_handle: Some("mp-1".into()),
            expected_checksum: Some(Sha256Digest::compute(b"chunk")),
            body_digest: Sha256Digest::compute(b"chunk"),
            retry_count: 1,
            staging_path: Some("/tmp/stage/t-1".into()),
            bytes: Bytes::from_static(b"chunk"),
            delivery_token: None,
        };

        let raw = RedisQueue::encode(&task).unwrap();
        let decoded = RedisQueue::decode(&raw).unwrap();

        assert_eq!(decoded.task_id, task.task_id);
        assert_eq!(decoded.chunk_index, 2);
        assert_eq!(decoded.staging_path, task.staging_path);
        assert_eq!(decoded.body_digest, task.body_digest);
        // the body itself never travels through the queue
        assert!(decoded.bytes.is_empty());
        // the delivery token is the raw payload, for exact LREM
        assert_eq!(decoded.delivery_token.as_deref(), Some(raw.as_str()));
    }
}
