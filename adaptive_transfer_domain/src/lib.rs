// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Domain
//!
//! Core business rules of the resumable chunked transfer service,
//! independent of databases, storage backends, queues, and HTTP. The domain
//! follows Domain-Driven Design layering:
//!
//! - **Entities** (`entities`) — objects with identity and lifecycle:
//!   [`entities::Upload`] with its status state machine, and
//!   [`entities::ChunkRecord`] rows unique by `(upload_id, chunk_index)`
//! - **Value objects** (`value_objects`) — immutable, self-validating
//!   values: [`value_objects::UploadId`], [`value_objects::ChunkSize`],
//!   [`value_objects::Sha256Digest`], [`value_objects::ByteRange`]
//! - **Repository ports** (`repositories`) — transactional metadata store
//!   and idempotency registry contracts
//! - **Service ports** (`services`) — blob storage and durable queue
//!   contracts, async because they front I/O
//! - **Errors** (`error`) — the [`error::TransferError`] taxonomy every
//!   layer speaks
//!
//! ## Key Invariants
//!
//! - an upload's chunk geometry is immutable after init
//! - status moves only along the state machine; terminal states are sticky
//! - a chunk is observable to complete/download only once `UPLOADED`
//! - the same idempotency key with a matching fingerprint replays; with a
//!   mismatched fingerprint it conflicts

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::{ChunkRecord, ChunkStatus, Upload, UploadStatus};
pub use error::{BackpressureReason, TransferError};
pub use repositories::{ChunkClaim, CompleteOutcome, IdempotencyStore, OperationKind, Reservation, UploadStore};
pub use services::{ByteStream, ChunkTask, DurableQueue, StorageBackend};
pub use value_objects::{ByteRange, ChunkSize, RollingSha256, Sha256Digest, UploadId};
