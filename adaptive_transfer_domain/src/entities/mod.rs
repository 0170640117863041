// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entities of the transfer domain: uploads and their chunk records.

pub mod chunk;
pub mod upload;

pub use chunk::{ChunkRecord, ChunkStatus};
pub use upload::{Upload, UploadStatus};
