// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision Utilities
//!
//! Wrappers around `tokio::spawn` for the service's background loops
//! (autoscaler tick, cleanup tick, queue consumers) so their lifecycle is
//! logged and their failures are captured instead of vanishing with the
//! task.

use tokio::task::JoinHandle;
use tracing::{debug, error};

use adaptive_transfer_domain::TransferError;

/// Result type alias for supervised application tasks.
pub type AppResult<T> = Result<T, TransferError>;

/// Spawns a task whose start, completion and failure are logged, returning
/// a handle the caller must eventually await.
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<AppResult<T>>
where
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");

    tokio::spawn(async move {
        let result = fut.await;

        match &result {
            Ok(_) => debug!(task = name, "task completed"),
            Err(e) => error!(task = name, error = %e, "task failed"),
        }

        result
    })
}

/// Awaits a supervised handle, converting panics and cancellations into
/// typed errors.
pub async fn join_supervised<T>(handle: JoinHandle<AppResult<T>>) -> AppResult<T> {
    match handle.await {
        Ok(task_result) => task_result,
        Err(e) if e.is_panic() => Err(TransferError::internal(format!("task panicked: {}", e))),
        Err(e) if e.is_cancelled() => Err(TransferError::cancelled("task cancelled")),
        Err(e) => Err(TransferError::internal(format!("task join failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_propagates() {
        let handle = spawn_supervised("ok-task", async { Ok::<i32, TransferError>(7) });
        assert_eq!(join_supervised(handle).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let handle = spawn_supervised("err-task", async {
            Err::<(), _>(TransferError::validation("boom"))
        });
        assert!(join_supervised(handle).await.is_err());
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let handle = tokio::spawn(async {
            panic!("test panic");
            #[allow(unreachable_code)]
            Ok::<(), TransferError>(())
        });
        let err = join_supervised(handle).await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }
}
