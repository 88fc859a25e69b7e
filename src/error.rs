// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error kind shared across the engine, orchestrator, and HTTP transport.
///
/// A single kind-tagged error type at the service boundary: background loops
/// never surface these to callers, only to logs and to the `error` event on
/// the relevant thread (see [`crate::event::ThreadEvent::Error`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Validation,
    RateLimited,
    AlreadyPending,
    DepthExceeded,
    Cancelled,
    Timeout,
    DriverCrash,
    Infrastructure,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Validation => 400,
            Self::RateLimited => 429,
            Self::AlreadyPending => 409,
            Self::DepthExceeded => 400,
            Self::Cancelled => 499,
            Self::Timeout => 504,
            Self::DriverCrash => 500,
            Self::Infrastructure => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::RateLimited => "RATE_LIMITED",
            Self::AlreadyPending => "ALREADY_PENDING",
            Self::DepthExceeded => "DEPTH_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::DriverCrash => "DRIVER_CRASH",
            Self::Infrastructure => "INFRASTRUCTURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kind-tagged error carrying a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadHostError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ThreadHostError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn already_pending(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyPending, message)
    }

    pub fn depth_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DepthExceeded, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn driver_crash(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DriverCrash, message)
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Infrastructure, message)
    }

    /// The HTTP response a transport handler returns for this error: status
    /// code per [`ErrorKind::http_status`] plus a machine-readable envelope.
    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status = StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: ErrorBody { code: self.kind.as_str().to_string(), message: self.message.clone() } };
        (status, Json(body))
    }
}

impl IntoResponse for ThreadHostError {
    fn into_response(self) -> Response {
        self.to_http_response().into_response()
    }
}

/// Top-level error response envelope returned by the HTTP surface (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ThreadHostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ThreadHostError {}

impl From<rusqlite::Error> for ThreadHostError {
    fn from(e: rusqlite::Error) -> Self {
        Self::infrastructure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThreadHostError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
