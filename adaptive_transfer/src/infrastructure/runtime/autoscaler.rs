// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Autoscaler
//!
//! Periodic resize decisions for the worker pool, driven by queue depth and
//! worker utilization.
//!
//! Decision rules, in priority order:
//!
//! - **grow** when queue depth or utilization crosses the scale-up
//!   threshold, the cooldown has passed, and the pool is below
//!   `max_workers`
//! - **shrink by one** when utilization is at or below the scale-down
//!   threshold with an empty queue, same cooldown, above `min_workers`
//! - otherwise hold
//!
//! The distinct up/down thresholds give hysteresis; the cooldown prevents
//! oscillation. Shrinking retires idle workers only.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use adaptive_transfer_bootstrap::ShutdownToken;
use adaptive_transfer_domain::DurableQueue;

use crate::infrastructure::config::AutoscaleSettings;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::worker_pool::WorkerPool;

/// What one tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    Grow(usize),
    Shrink(usize),
    Hold,
}

/// Inputs to one scaling decision.
#[derive(Debug, Clone, Copy)]
pub struct ScaleInputs {
    pub queue_depth: u64,
    pub worker_count: usize,
    pub busy_workers: usize,
    pub since_last_scale: Duration,
}

/// Pure decision function; the tick loop feeds it live inputs.
pub fn decide(settings: &AutoscaleSettings, inputs: ScaleInputs) -> ScaleDecision {
    let utilization = if inputs.worker_count == 0 {
        1.0
    } else {
        inputs.busy_workers as f64 / inputs.worker_count as f64
    };
    let cooled_down = inputs.since_last_scale >= Duration::from_secs(settings.cooldown_seconds);

    let wants_up =
        inputs.queue_depth >= settings.scale_up_queue_threshold || utilization >= settings.scale_up_utilization;
    if wants_up && cooled_down && inputs.worker_count < settings.max_workers {
        return ScaleDecision::Grow((inputs.worker_count + 1).min(settings.max_workers));
    }

    let wants_down = utilization <= settings.scale_down_utilization && inputs.queue_depth == 0;
    if wants_down && cooled_down && inputs.worker_count > settings.min_workers {
        return ScaleDecision::Shrink(inputs.worker_count - 1);
    }

    ScaleDecision::Hold
}

/// Periodic autoscaler for the worker pool.
pub struct Autoscaler {
    settings: AutoscaleSettings,
    pool: Arc<WorkerPool>,
    queue: Arc<dyn DurableQueue>,
    metrics: Arc<MetricsService>,
}

impl Autoscaler {
    pub fn new(
        settings: AutoscaleSettings,
        pool: Arc<WorkerPool>,
        queue: Arc<dyn DurableQueue>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            settings,
            pool,
            queue,
            metrics,
        }
    }

    /// Tick loop; runs until shutdown.
    pub async fn run(self, shutdown: ShutdownToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.settings.tick_seconds.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_scale = Instant::now();
        info!(
            min = self.settings.min_workers,
            max = self.settings.max_workers,
            cooldown_seconds = self.settings.cooldown_seconds,
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let queue_depth = match self.queue.depth().await {
                Ok(depth) => depth,
                Err(e) => {
                    warn!(error = %e, "cannot read queue depth, skipping tick");
                    continue;
                }
            };
            self.metrics.set_queue_depth(queue_depth);

            let inputs = ScaleInputs {
                queue_depth,
                worker_count: self.pool.worker_count(),
                busy_workers: self.pool.busy_count(),
                since_last_scale: last_scale.elapsed(),
            };

            match decide(&self.settings, inputs) {
                ScaleDecision::Grow(target) => {
                    info!(
                        queue_depth,
                        workers = inputs.worker_count,
                        busy = inputs.busy_workers,
                        target,
                        "scaling up"
                    );
                    self.pool.resize(target);
                    last_scale = Instant::now();
                }
                ScaleDecision::Shrink(target) => {
                    info!(
                        queue_depth,
                        workers = inputs.worker_count,
                        busy = inputs.busy_workers,
                        target,
                        "scaling down"
                    );
                    self.pool.resize(target);
                    last_scale = Instant::now();
                }
                ScaleDecision::Hold => {
                    debug!(queue_depth, workers = inputs.worker_count, busy = inputs.busy_workers, "holding");
                }
            }
        }

        info!("autoscaler stopped");
    }
}
