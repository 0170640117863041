// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Admin Route Handlers
//!
//! `/v1/admin/*`: maintenance trigger, restricted to admin principals.
//! Admin principals bypass ownership only here, never on upload routes.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use adaptive_transfer_domain::TransferError;

use crate::presentation::http::auth::{Principal, RequestId};
use crate::presentation::http::error::ApiError;
use crate::presentation::http::state::AppState;

/// `POST /v1/admin/cleanup` - one synchronous maintenance pass.
pub async fn run_cleanup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
) -> Result<impl IntoResponse, ApiError> {
    if !principal.admin {
        return Err(ApiError::new(
            TransferError::auth("maintenance requires an admin principal"),
            request_id.0,
        ));
    }

    let report = state
        .maintenance
        .run_once()
        .await
        .map_err(|e| ApiError::new(e, request_id.0))?;
    Ok(Json(report))
}
