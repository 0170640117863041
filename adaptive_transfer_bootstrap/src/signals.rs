// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Signal Handling
//!
//! Maps process signals onto shutdown initiation.
//!
//! - **SIGTERM** - orchestrator-driven stop
//! - **SIGINT** - operator interrupt (Ctrl+C)
//! - **SIGHUP** - terminal closed (Unix only)
//!
//! Windows builds fall back to Ctrl+C only.

use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;

/// Waits for the first shutdown signal.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGTERM handler");
            return std::future::pending().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGINT handler");
            return std::future::pending().await;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGHUP handler");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT (Ctrl+C)"),
        _ = sighup.recv() => tracing::info!("received SIGHUP"),
    }
}

/// Waits for Ctrl+C on platforms without Unix signals.
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received Ctrl+C");
}

/// Spawns the signal listener; the first signal initiates shutdown on the
/// coordinator.
pub fn install(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        coordinator.initiate();
    });
}
