// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication middleware (§6 config: `THREADHOST_AUTH_TOKEN`).
//!
//! Authentication failure is not one of §7's error kinds (not-found,
//! validation, rate-limited, already-pending, depth-exceeded, cancelled,
//! timeout, driver-crash, infrastructure) — it is rejected at the transport
//! boundary before a handler ever constructs a [`ThreadHostError`].

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ErrorBody, ErrorResponse};
use crate::transport::state::AppState;

/// Constant-time string comparison, avoiding a timing side-channel on the
/// configured token.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. `Ok(())` when `expected` is
/// `None` (auth disabled) or the header matches.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ()> {
    let Some(expected) = expected else { return Ok(()) };

    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(())?;
    let token = header.strip_prefix("Bearer ").ok_or(())?;

    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(())
    }
}

/// Paths exempt from auth: the liveness probe must answer regardless of
/// whether the caller can authenticate.
const AUTH_EXEMPT_PATHS: &[&str] = &["/health"];

/// Axum middleware enforcing Bearer auth on every route except
/// [`AUTH_EXEMPT_PATHS`]. A `None` `auth_token` in config disables auth entirely.
pub async fn auth_layer(State(state): State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    if AUTH_EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    if validate_bearer(req.headers(), state.app.config.auth_token.as_deref()).is_err() {
        let body = ErrorResponse { error: ErrorBody { code: "UNAUTHORIZED".to_string(), message: "missing or invalid bearer token".to_string() } };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
