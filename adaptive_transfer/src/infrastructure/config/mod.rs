// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Configuration loading for the transfer service.

pub mod settings;

pub use settings::{
    AuthMode, AuthSettings, AutoscaleSettings, BearerSettings, CleanupSettings, DatabaseSettings, LimitSettings,
    LoggingSettings, QueueBackendKind, QueueSettings, ServerSettings, ServiceConfig, StorageBackendKind,
    StorageSettings, TracingSettings, UploadSettings, WorkerSettings,
};
