// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Completion Registry
//!
//! Decouples the client-facing chunk request from task execution. The
//! acceptance path registers the task id together with its admission permit
//! and receives a one-shot channel; the executor reports the terminal
//! outcome through the registry, which releases the permit and wakes the
//! waiter.
//!
//! A waiter that times out or disconnects does not cancel the task - the
//! entry stays until the task terminates, so limiter tokens are released on
//! the task's terminal outcome, exactly once.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::debug;

use adaptive_transfer_domain::TransferError;

use crate::infrastructure::runtime::limiters::AdmissionPermit;

/// Terminal outcome of a chunk task, as delivered to the waiting request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    pub chunk_index: u64,
    /// The chunk was already persisted with the same body; no storage write
    /// happened.
    pub duplicate: bool,
}

pub type TaskResult = Result<ChunkOutcome, TransferError>;

struct PendingTask {
    permit: AdmissionPermit,
    waiter: Option<oneshot::Sender<TaskResult>>,
}

/// Task-id keyed registry of in-flight chunk tasks.
#[derive(Default)]
pub struct CompletionRegistry {
    inner: Mutex<HashMap<String, PendingTask>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task before it is enqueued. The permit lives in the
    /// registry until the task terminates.
    pub fn register(&self, task_id: &str, permit: AdmissionPermit) -> oneshot::Receiver<TaskResult> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        inner.insert(
            task_id.to_string(),
            PendingTask {
                permit,
                waiter: Some(tx),
            },
        );
        rx
    }

    /// Called when a worker takes the task off the queue: the queue slot is
    /// free for the next admission while the inflight counters stay held.
    pub fn on_dequeued(&self, task_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.get_mut(task_id) {
            pending.permit.release_queue_slot();
        }
    }

    /// Reports the task's terminal outcome: releases the admission permit,
    /// then wakes the waiter (when still there).
    pub fn complete(&self, task_id: &str, result: TaskResult) {
        let pending = self.inner.lock().remove(task_id);
        match pending {
            Some(mut pending) => {
                let waiter = pending.waiter.take();
                // Release the inflight tokens before signaling, so a waiter
                // woken by the result never observes its own slot as held.
                drop(pending);
                if let Some(waiter) = waiter {
                    if waiter.send(result).is_err() {
                        debug!(task_id, "chunk waiter went away before completion");
                    }
                }
            }
            None => debug!(task_id, "completion for unknown task"),
        }
    }

    /// Number of tasks between admission and terminal outcome.
    pub fn pending(&self) -> usize {
        self.inner.lock().len()
    }
}
