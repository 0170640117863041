// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Graceful-shutdown plumbing shared by the HTTP server, the worker pool,
//! and the periodic tickers (autoscaler, cleanup).
//!
//! ## Protocol
//!
//! 1. A signal (or an operator action) calls
//!    [`ShutdownCoordinator::initiate`]
//! 2. Every component holding a [`ShutdownToken`] observes the flip and
//!    stops taking new work; in-flight chunk tasks run to their terminal
//!    state — shutdown never cancels an admitted storage write
//! 3. Components report in through [`DrainGuard`] drops; `initiate`'s caller
//!    awaits [`ShutdownCoordinator::drained`] under the configured grace
//!    period and forces exit when the period elapses

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Default grace period before a forced exit.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(20);

/// Clone-able shutdown signal observed by long-running tasks.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Checks the flag without waiting.
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until shutdown is initiated. Returns immediately when it
    /// already was.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // The sender lives inside the coordinator; a dropped coordinator
        // counts as shutdown.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

/// Registration of one drainable component; dropping it reports the
/// component as drained.
pub struct DrainGuard {
    inner: Arc<DrainState>,
}

struct DrainState {
    outstanding: AtomicUsize,
    drained: Notify,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

/// Coordinates shutdown initiation and component drain across the process.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    drain: Arc<DrainState>,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            drain: Arc::new(DrainState {
                outstanding: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
            grace_period,
        }
    }

    /// Hands out a shutdown token for a long-running task.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken { rx: self.tx.subscribe() }
    }

    /// Registers a component that must finish draining before the process
    /// exits.
    pub fn register_drain(&self) -> DrainGuard {
        self.drain.outstanding.fetch_add(1, Ordering::AcqRel);
        DrainGuard {
            inner: Arc::clone(&self.drain),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flips the shutdown flag exactly once; repeated calls are no-ops.
    pub fn initiate(&self) {
        let was_running = self.tx.send_replace(true);
        if !was_running {
            tracing::info!(grace_period = ?self.grace_period, "initiating graceful shutdown");
        }
    }

    /// Waits for every registered component to drain, bounded by the grace
    /// period. Returns `false` when the period elapsed first.
    pub async fn drained(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.grace_period;
        loop {
            let notified = self.drain.drained.notified();
            tokio::pin!(notified);
            // Register before re-checking, so a guard dropped in between
            // still wakes this waiter.
            notified.as_mut().enable();

            if self.drain.outstanding.load(Ordering::Acquire) == 0 {
                return true;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        outstanding = self.drain.outstanding.load(Ordering::Acquire),
                        "shutdown grace period expired with components still draining"
                    );
                    return false;
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_observes_initiate() {
        let coordinator = ShutdownCoordinator::default();
        let token = coordinator.token();
        assert!(!token.is_shutting_down());

        coordinator.initiate();
        assert!(token.is_shutting_down());
        // cancelled() must return immediately once flipped
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_token_wakes_waiter() {
        let coordinator = ShutdownCoordinator::default();
        let token = coordinator.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.initiate();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter must wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_initiate_is_idempotent() {
        let coordinator = ShutdownCoordinator::default();
        coordinator.initiate();
        coordinator.initiate();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_drained_with_no_registrations() {
        let coordinator = ShutdownCoordinator::default();
        coordinator.initiate();
        assert!(coordinator.drained().await);
    }

    #[tokio::test]
    async fn test_drained_waits_for_guards() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let guard = coordinator.register_drain();
        coordinator.initiate();

        let dropper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        assert!(coordinator.drained().await);
        dropper.await.unwrap();
    }

    #[tokio::test]
    async fn test_drained_times_out() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(40));
        let _guard = coordinator.register_drain();
        coordinator.initiate();
        assert!(!coordinator.drained().await);
    }
}
