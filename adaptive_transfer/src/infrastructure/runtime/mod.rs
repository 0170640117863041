// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Execution runtime: admission limiters, completion registry, worker pool,
//! autoscaler, rate limiting, and task supervision.

pub mod autoscaler;
pub mod completion;
pub mod limiters;
pub mod rate_limiter;
pub mod supervisor;
pub mod worker_pool;

pub use autoscaler::{decide, Autoscaler, ScaleDecision, ScaleInputs};
pub use completion::{ChunkOutcome, CompletionRegistry, TaskResult};
pub use limiters::{AdmissionController, AdmissionPermit};
pub use rate_limiter::RateLimiter;
pub use worker_pool::{ChunkExecutor, ExecutionVerdict, WorkerPool};
