// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Route Handlers
//!
//! `/v1/uploads/*` handlers: init, chunk put, complete, missing-chunks,
//! status, abort. Handlers translate between the HTTP surface and the
//! upload service; all policy lives in the service.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Serialize;

use adaptive_transfer_domain::{Sha256Digest, TransferError, UploadId, UploadStatus};

use crate::application::services::{CompleteResult, InitUploadRequest};
use crate::presentation::http::auth::{Principal, RequestId};
use crate::presentation::http::error::ApiError;
use crate::presentation::http::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const CHUNK_CHECKSUM_HEADER: &str = "x-chunk-sha256";

fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(IDEMPOTENCY_KEY_HEADER).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Serialize)]
pub struct MissingChunksResponse {
    pub missing: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub status: &'static str,
}

/// `POST /v1/uploads/init`
pub async fn init_upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(request): Json<InitUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .uploads
        .init(&principal.name, request, idempotency_key(&headers))
        .await
        .map_err(|e| ApiError::new(e, request_id.0))?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `PUT /v1/uploads/{id}/chunks/{index}`
pub async fn put_chunk(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    Path((upload_id, chunk_index)): Path<(String, u64)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id, &request_id)?;

    if body.len() as u64 > state.max_chunk_size {
        return Err(ApiError::new(
            TransferError::validation(format!(
                "chunk body of {} bytes exceeds the configured maximum of {}",
                body.len(),
                state.max_chunk_size
            )),
            request_id.0,
        )
        .with_status(StatusCode::PAYLOAD_TOO_LARGE)
        .with_upload(upload_id));
    }

    let declared_checksum = match headers.get(CHUNK_CHECKSUM_HEADER).and_then(|v| v.to_str().ok()) {
        Some(hex) => Some(
            Sha256Digest::from_hex(hex)
                .map_err(|e| ApiError::new(e, request_id.0.clone()).with_upload(upload_id))?,
        ),
        None => None,
    };

    let response = state
        .uploads
        .accept_chunk(
            &principal.name,
            upload_id,
            chunk_index,
            body,
            declared_checksum,
            idempotency_key(&headers),
        )
        .await
        .map_err(|e| ApiError::new(e, request_id.0).with_upload(upload_id))?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `POST /v1/uploads/{id}/complete`
pub async fn complete_upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<serde_json::Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id, &request_id)?;
    let file_checksum = body
        .as_ref()
        .and_then(|Json(v)| v.get("file_checksum_sha256"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let result = state
        .uploads
        .complete(&principal.name, upload_id, file_checksum, idempotency_key(&headers))
        .await
        .map_err(|e| ApiError::new(e, request_id.0.clone()).with_upload(upload_id))?;

    match result {
        CompleteResult::Completed => Ok((
            StatusCode::OK,
            Json(CompleteResponse {
                status: UploadStatus::Completed.as_str(),
            }),
        )),
        CompleteResult::MissingChunks(missing) => Err(ApiError::new(
            TransferError::conflict(format!("{} chunks are not uploaded yet", missing.len())),
            request_id.0,
        )
        .with_upload(upload_id)
        .with_missing(missing)),
        CompleteResult::AlreadyTerminal(status) => Err(ApiError::new(
            TransferError::conflict(format!("upload is already {}", status)),
            request_id.0,
        )
        .with_status(StatusCode::LOCKED)
        .with_upload(upload_id)),
    }
}

/// `GET /v1/uploads/{id}/missing-chunks`
pub async fn missing_chunks(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id, &request_id)?;
    let missing = state
        .uploads
        .missing_chunks(&principal.name, upload_id)
        .await
        .map_err(|e| ApiError::new(e, request_id.0).with_upload(upload_id))?;
    Ok(Json(MissingChunksResponse { missing }))
}

/// `GET /v1/uploads/{id}`
pub async fn upload_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id, &request_id)?;
    let report = state
        .uploads
        .status(&principal.name, upload_id)
        .await
        .map_err(|e| ApiError::new(e, request_id.0).with_upload(upload_id))?;
    Ok(Json(report))
}

/// `DELETE /v1/uploads/{id}`
pub async fn abort_upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id, &request_id)?;
    state
        .uploads
        .abort(&principal.name, upload_id)
        .await
        .map_err(|e| ApiError::new(e, request_id.0).with_upload(upload_id))?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_upload_id(raw: &str, request_id: &RequestId) -> Result<UploadId, ApiError> {
    UploadId::parse(raw).map_err(|e| ApiError::new(e, request_id.0.clone()))
}
