// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Server
//!
//! Router assembly and the serving loop. The `/v1` surface sits behind the
//! auth middleware; `/health`, `/version` and `/metrics` are open. The
//! server drains connections on shutdown via the coordinator's token.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use adaptive_transfer_bootstrap::ShutdownToken;
use adaptive_transfer_domain::TransferError;

use crate::presentation::http::auth::require_principal;
use crate::presentation::http::handlers::{admin, download, ops, uploads};
use crate::presentation::http::state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    // Chunk bodies are the largest requests; leave headroom over the
    // configured chunk ceiling.
    let body_limit = (state.max_chunk_size as usize).saturating_add(64 * 1024);

    let v1 = Router::new()
        .route("/uploads/init", post(uploads::init_upload))
        .route(
            "/uploads/:id",
            get(uploads::upload_status).delete(uploads::abort_upload),
        )
        .route("/uploads/:id/chunks/:index", put(uploads::put_chunk))
        .route("/uploads/:id/complete", post(uploads::complete_upload))
        .route("/uploads/:id/missing-chunks", get(uploads::missing_chunks))
        .route("/uploads/:id/download", get(download::download))
        .route("/admin/cleanup", post(admin::run_cleanup))
        .layer(middleware::from_fn_with_state(state.clone(), require_principal));

    Router::new()
        .route("/health", get(ops::health))
        .route("/version", get(ops::version))
        .route("/metrics", get(ops::metrics))
        .nest("/v1", v1)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Binds and serves until shutdown is initiated.
pub async fn serve(bind: &str, router: Router, shutdown: ShutdownToken) -> Result<(), TransferError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| TransferError::internal(format!("cannot bind {}: {}", bind, e)))?;
    info!(bind, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| TransferError::internal(format!("http server failed: {}", e)))?;

    info!("http server stopped");
    Ok(())
}
