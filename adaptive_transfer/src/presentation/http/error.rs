// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # API Error Mapping
//!
//! Translates `TransferError` into HTTP responses with the standard error
//! body `{detail, error_code, request_id, upload_id?}`. Backpressure
//! refusals add `Retry-After` and `X-Backpressure-Reason` headers naming
//! the refusing limiter.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use adaptive_transfer_domain::{TransferError, UploadId};

pub const BACKPRESSURE_REASON_HEADER: &str = "x-backpressure-reason";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standard error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_code: &'static str,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Missing chunk indices on a complete conflict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u64>>,
}

/// An error response in flight.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: TransferError,
    request_id: String,
    upload_id: Option<UploadId>,
    missing: Option<Vec<u64>>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(error: TransferError, request_id: impl Into<String>) -> Self {
        Self {
            status: status_for(&error),
            error,
            request_id: request_id.into(),
            upload_id: None,
            missing: None,
            retry_after: None,
        }
    }

    pub fn with_upload(mut self, upload_id: UploadId) -> Self {
        self.upload_id = Some(upload_id);
        self
    }

    /// Overrides the status code for cases the taxonomy maps ambiguously
    /// (409 vs 423, 400 vs 413).
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_missing(mut self, missing: Vec<u64>) -> Self {
        self.missing = Some(missing);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(error: &TransferError) -> StatusCode {
    match error {
        TransferError::Validation(_) => StatusCode::BAD_REQUEST,
        TransferError::Auth(_) => StatusCode::FORBIDDEN,
        TransferError::NotFound(_) => StatusCode::NOT_FOUND,
        TransferError::Conflict(_) => StatusCode::CONFLICT,
        TransferError::Checksum(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TransferError::Backpressure(_) => StatusCode::TOO_MANY_REQUESTS,
        TransferError::Range(_) => StatusCode::RANGE_NOT_SATISFIABLE,
        TransferError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        TransferError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
        TransferError::PermanentStorage(_)
        | TransferError::Database(_)
        | TransferError::Serialization(_)
        | TransferError::Cancelled(_)
        | TransferError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.error.to_string(),
            error_code: self.error.error_code(),
            request_id: self.request_id.clone(),
            upload_id: self.upload_id.map(|id| id.to_string()),
            missing: self.missing,
        };

        let mut response = (self.status, Json(body)).into_response();
        let headers = response.headers_mut();

        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        if let Some(reason) = self.error.backpressure_reason() {
            headers.insert(
                HeaderName::from_static(BACKPRESSURE_REASON_HEADER),
                HeaderValue::from_static(reason.as_str()),
            );
            let retry_after = self.retry_after.unwrap_or(1);
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
        } else if let Some(retry_after) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_transfer_domain::BackpressureReason;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&TransferError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&TransferError::auth("x")), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&TransferError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&TransferError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(status_for(&TransferError::checksum("x")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&TransferError::Backpressure(BackpressureReason::GlobalFull)),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(&TransferError::range("x")), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(status_for(&TransferError::internal("x")), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_backpressure_headers() {
        let error = ApiError::new(
            TransferError::Backpressure(BackpressureReason::FairShareFull),
            "req-1",
        );
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(BACKPRESSURE_REASON_HEADER).unwrap(),
            "fair-share-full"
        );
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
