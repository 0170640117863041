// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure ports of the transfer domain.
//!
//! These traits deal with I/O and therefore stay async; the infrastructure
//! layer provides the concrete adapters.

pub mod durable_queue;
pub mod storage_backend;

pub use durable_queue::{ChunkTask, DurableQueue};
pub use storage_backend::{ByteStream, StorageBackend};
