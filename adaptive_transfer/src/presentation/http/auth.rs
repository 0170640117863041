// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Authentication and Per-Request Middleware
//!
//! Resolves the calling principal from either an API key (`X-API-Key`
//! mapped through configuration) or a bearer token (HMAC-signed JWT whose
//! `sub` is the principal), per the configured auth mode. Hybrid mode
//! accepts both.
//!
//! The middleware also assigns a request id, applies the per-principal rate
//! limit, and stamps the request id onto every response.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

use adaptive_transfer_domain::TransferError;

use crate::infrastructure::config::{AuthMode, AuthSettings};
use crate::infrastructure::runtime::RateLimiter;
use crate::presentation::http::error::{ApiError, REQUEST_ID_HEADER};
use crate::presentation::http::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    pub admin: bool,
}

/// Correlation id assigned to each request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Debug, Deserialize)]
struct BearerClaims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Header-to-principal resolution for the configured auth mode.
pub struct Authenticator {
    mode: AuthMode,
    api_keys: BTreeMap<String, String>,
    admin_principals: BTreeSet<String>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(settings: &AuthSettings) -> Result<Self, TransferError> {
        let algorithm = match settings.bearer.algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(TransferError::validation(format!(
                    "unsupported bearer algorithm '{}'",
                    other
                )))
            }
        };

        let mut validation = Validation::new(algorithm);
        match &settings.bearer.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &settings.bearer.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            mode: settings.mode,
            api_keys: settings.api_keys.clone(),
            admin_principals: settings.admin_principals.clone(),
            decoding_key: DecodingKey::from_secret(settings.bearer.secret.as_bytes()),
            validation,
        })
    }

    /// Resolves the principal, or explains why the credential is missing or
    /// invalid.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, String> {
        let by_api_key = || -> Result<Principal, String> {
            let key = headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| format!("missing {} header", API_KEY_HEADER))?;
            let name = self
                .api_keys
                .get(key)
                .ok_or_else(|| "unknown api key".to_string())?
                .clone();
            Ok(self.principal(name))
        };

        let by_bearer = || -> Result<Principal, String> {
            let token = headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(|| "missing bearer token".to_string())?;
            let data = jsonwebtoken::decode::<BearerClaims>(token, &self.decoding_key, &self.validation)
                .map_err(|e| format!("invalid bearer token: {}", e))?;
            Ok(self.principal(data.claims.sub))
        };

        match self.mode {
            AuthMode::ApiKey => by_api_key(),
            AuthMode::Bearer => by_bearer(),
            AuthMode::Hybrid => by_api_key().or_else(|api_key_error| {
                by_bearer().map_err(|bearer_error| format!("{}; {}", api_key_error, bearer_error))
            }),
        }
    }

    fn principal(&self, name: String) -> Principal {
        let admin = self.admin_principals.contains(&name);
        Principal { name, admin }
    }
}

/// Per-request middleware: request id, authentication, rate limiting.
pub async fn require_principal(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4().to_string());

    let principal = match state.authenticator.authenticate(request.headers()) {
        Ok(principal) => principal,
        Err(detail) => {
            debug!(request_id = %request_id.0, detail, "authentication failed");
            return ApiError::new(TransferError::auth(detail), request_id.0)
                .with_status(StatusCode::UNAUTHORIZED)
                .into_response();
        }
    };

    if let Err(e) = state.rate_limiter.check(&principal.name) {
        return ApiError::new(e, request_id.0)
            .with_retry_after(RateLimiter::retry_after_seconds())
            .into_response();
    }

    request.extensions_mut().insert(principal);
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response
            .headers_mut()
            .entry(HeaderName::from_static(REQUEST_ID_HEADER))
            .or_insert(value);
    }
    response
}

/// Issues a bearer token, for tests and operator tooling.
pub fn issue_token(secret: &str, sub: &str, exp: usize) -> String {
    #[derive(serde::Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        exp: usize,
    }
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &Claims { sub, exp },
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encoding")
}
