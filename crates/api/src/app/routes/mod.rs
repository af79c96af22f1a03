use axum::Json;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::{Value, json};

use restohub_core::RestError;

use crate::app::errors;

pub mod auth;
pub mod invitations;
pub mod system;
pub mod users;

/// `{"data": ..., "meta": {"permissions": ...}}` envelope used by resource endpoints.
pub(crate) fn with_permissions<T: Serialize, P: Serialize>(data: T, permissions: P) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": { "permissions": permissions },
    }))
}

pub(crate) fn respond(result: Result<Json<Value>, RestError>) -> axum::response::Response {
    match result {
        Ok(body) => body.into_response(),
        Err(err) => errors::rest_error_to_response(err),
    }
}
