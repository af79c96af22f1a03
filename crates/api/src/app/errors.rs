use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use restohub_core::RestError;

pub fn rest_error_to_response(err: RestError) -> axum::response::Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::error!(kind = %err.kind(), message = err.message(), causes = ?err.causes(), "request failed");
    } else {
        tracing::debug!(kind = %err.kind(), message = err.message(), "request rejected");
    }

    json_error(status, err.kind().as_str(), err.message())
}

pub fn json_error(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "status": status.as_u16(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_kind() {
        let response = rest_error_to_response(RestError::forbidden("no"));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = rest_error_to_response(RestError::validation("bad email"));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
