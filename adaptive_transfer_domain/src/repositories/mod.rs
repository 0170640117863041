// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Repository ports of the transfer domain.
//!
//! Async traits implemented by the infrastructure layer (SQLite today);
//! the domain only sees the contracts.

pub mod idempotency_store;
pub mod upload_store;

pub use idempotency_store::{IdempotencyStore, OperationKind, Reservation};
pub use upload_store::{ChunkClaim, CompleteOutcome, UploadStore};
