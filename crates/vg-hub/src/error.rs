//! # Error Types
//!
//! [`QueryError`] is the failure taxonomy of the query engine. Every variant
//! is user-attributable and surfaces as a distinct `kind` in the JSON body;
//! nothing is retried or swallowed. [`ApiError`] covers the remaining HTTP
//! surface (ingestion bodies, unknown entities).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use vg_core::{CursorParseError, EntityKind, FieldKind, Operator};
use vg_store::StoreError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown field '{field}' for entity type '{entity}'")]
    UnknownField { entity: EntityKind, field: String },

    #[error("operator '{op}' is not supported on {kind} field '{field}'")]
    UnsupportedOperator {
        field: String,
        op: Operator,
        kind: FieldKind,
    },

    #[error("invalid {kind} value '{value}' for field '{field}'")]
    InvalidLiteral {
        field: String,
        value: String,
        kind: FieldKind,
    },

    #[error("invalid time window: {0}")]
    InvalidWindow(String),

    #[error("invalid page: {0}")]
    InvalidPage(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl QueryError {
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax",
            Self::UnknownField { .. } => "unknown_field",
            Self::UnsupportedOperator { .. } => "unsupported_operator",
            Self::InvalidLiteral { .. } => "invalid_literal",
            Self::InvalidWindow(_) => "invalid_window",
            Self::InvalidPage(_) => "invalid_page",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<CursorParseError> for QueryError {
    fn from(err: CursorParseError) -> Self {
        Self::InvalidCursor(err.0)
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        error_body(self.status(), self.kind(), self.to_string())
    }
}

/// Failures outside the query engine.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Query(err) => err.into_response(),
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Store(err) => error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                err.to_string(),
            ),
        }
    }
}

fn error_body(status: StatusCode, kind: &str, message: String) -> Response {
    let body = Json(json!({
        "error": message,
        "kind": kind,
        "status": status.as_u16()
    }));
    (status, body).into_response()
}
