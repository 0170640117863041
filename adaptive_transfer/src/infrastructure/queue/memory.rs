// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Task Queue
//!
//! Bounded FIFO for direct execution mode, built on a tokio mpsc channel.
//! `enqueue` blocks up to the put timeout when the queue is full and then
//! refuses with `Backpressure(QueueFull)`; `ack`/`nack` collapse to
//! in-process disposal, with `nack(retry)` re-enqueueing the task.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use adaptive_transfer_domain::{BackpressureReason, ChunkTask, DurableQueue, TransferError};

/// Bounded in-process chunk-task queue.
pub struct MemoryQueue {
    tx: mpsc::Sender<ChunkTask>,
    rx: Mutex<mpsc::Receiver<ChunkTask>>,
    capacity: usize,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, task: ChunkTask, timeout: Duration) -> Result<(), TransferError> {
        match tokio::time::timeout(timeout, self.tx.send(task)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransferError::internal("task queue receiver dropped")),
            Err(_) => Err(TransferError::Backpressure(BackpressureReason::QueueFull)),
        }
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ChunkTask>, TransferError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(task)) => Ok(Some(task)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&self, _task: &ChunkTask) -> Result<(), TransferError> {
        Ok(())
    }

    async fn nack(&self, task: &ChunkTask, retry: bool) -> Result<(), TransferError> {
        if retry {
            // Immediate re-submission; a full queue surfaces as queue-full
            // and the caller marks the chunk FAILED.
            self.enqueue(task.clone(), Duration::from_millis(250)).await
        } else {
            Ok(())
        }
    }

    async fn depth(&self) -> Result<u64, TransferError> {
        Ok((self.capacity - self.tx.capacity()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_transfer_domain::{Sha256Digest, UploadId};
    use bytes::Bytes;

    fn task(index: u64) -> ChunkTask {
        let upload_id = UploadId::new();
        ChunkTask {
            task_id: format!("t-{}", index),
            upload_id,
            chunk_index: index,
            storage_key: format!("{}/{}", upload_id, index),
            multipart_handle: None,
            expected_checksum: None,
            body_digest: Sha256Digest::compute(b"body"),
            retry_count: 0,
            staging_path: None,
            bytes: Bytes::from_static(b"body"),
            delivery_token: None,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new(8);
        for i in 0..3 {
            queue.enqueue(task(i), Duration::from_secs(1)).await.unwrap();
        }
        for expected in 0..3 {
            let got = queue.dequeue(Duration::from_secs(1)).await.unwrap().unwrap();
            assert_eq!(got.chunk_index, expected);
        }
    }

    #[tokio::test]
    async fn test_full_queue_refuses_after_timeout() {
        let queue = MemoryQueue::new(1);
        queue.enqueue(task(0), Duration::from_secs(1)).await.unwrap();

        let err = queue.enqueue(task(1), Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.backpressure_reason(), Some(BackpressureReason::QueueFull));
    }

    #[tokio::test]
    async fn test_enqueue_unblocks_when_slot_frees() {
        let queue = std::sync::Arc::new(MemoryQueue::new(1));
        queue.enqueue(task(0), Duration::from_secs(1)).await.unwrap();

        let q2 = queue.clone();
        let putter = tokio::spawn(async move { q2.enqueue(task(1), Duration::from_secs(2)).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let first = queue.dequeue(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.chunk_index, 0);

        putter.await.unwrap().unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_empty() {
        let queue = MemoryQueue::new(4);
        assert!(queue.dequeue(Duration::from_millis(30)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nack_retry_requeues() {
        let queue = MemoryQueue::new(4);
        let t = task(0);
        queue.nack(&t, true).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);

        queue.nack(&t, false).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);
    }
}
