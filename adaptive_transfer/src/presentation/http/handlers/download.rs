// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Download Route Handler
//!
//! `GET /v1/uploads/{id}/download`: streams the assembled file, honoring a
//! single-range `Range` header with a 206 response and `Content-Range`.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;

use adaptive_transfer_domain::UploadId;

use crate::presentation::http::auth::{Principal, RequestId};
use crate::presentation::http::error::ApiError;
use crate::presentation::http::state::AppState;

/// `GET /v1/uploads/{id}/download`
pub async fn download(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(request_id): Extension<RequestId>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let upload_id =
        UploadId::parse(&upload_id).map_err(|e| ApiError::new(e, request_id.0.clone()))?;
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let download = state
        .downloads
        .download(&principal.name, upload_id, range_header)
        .await
        .map_err(|e| ApiError::new(e, request_id.0.clone()).with_upload(upload_id))?;

    let status = if download.range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.content_length)
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(range) = download.range {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start(), range.end(), download.file_size),
        );
    }

    // Advertise the original file name.
    let disposition = format!("attachment; filename=\"{}\"", sanitize_file_name(&download.file_name));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response = response.header(header::CONTENT_DISPOSITION, value);
    }

    response
        .body(Body::from_stream(download.stream))
        .map_err(|e| {
            ApiError::new(
                adaptive_transfer_domain::TransferError::internal(format!("response build failed: {}", e)),
                request_id.0,
            )
        })
        .map(IntoResponse::into_response)
}

/// Keeps the advertised file name header-safe.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect()
}
