//! Error model shared by every layer.
//!
//! A [`RestError`] pairs an [`ErrorKind`] (which decides the HTTP status) with
//! a human readable message and an optional list of underlying causes. The
//! transport layer renders it as `{"error", "message", "status"}`.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the service layers.
pub type RestResult<T> = Result<T, RestError>;

/// Closed set of failure categories understood by the transport layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    ValidationError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::BadRequest,
        ErrorKind::Unauthorized,
        ErrorKind::Forbidden,
        ErrorKind::NotFound,
        ErrorKind::InternalServerError,
        ErrorKind::ValidationError,
    ];

    /// HTTP status code this kind is rendered with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InternalServerError => 500,
            ErrorKind::ValidationError => 422,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InternalServerError => "internal_server_error",
            ErrorKind::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorized failure carried from the domain up to the HTTP boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RestError {
    kind: ErrorKind,
    message: String,
    causes: Vec<String>,
}

impl RestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServerError, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, msg)
    }

    /// Attach an underlying cause. Causes are logged, never rendered to clients.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.causes.push(cause.to_string());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_status_codes() {
        let mut codes: Vec<u16> = ErrorKind::ALL.iter().map(|k| k.status_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes, vec![400, 401, 403, 404, 422, 500]);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = RestError::forbidden("nope");
        assert_eq!(err.to_string(), "forbidden: nope");
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn causes_accumulate_without_touching_message() {
        let err = RestError::internal("storage failure")
            .with_cause("connection reset")
            .with_cause(42);
        assert_eq!(err.message(), "storage failure");
        assert_eq!(err.causes(), ["connection reset", "42"]);
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InternalServerError).unwrap();
        assert_eq!(json, "\"internal_server_error\"");
    }
}
