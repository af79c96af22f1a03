use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use restohub_core::RestError;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CurrentSession;
use crate::cookies;

pub const NO_ACTIVE_SESSION: &str = "Unauthorised user. No active session";

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
    /// Set by the provider when the user declined consent.
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/auth/:provider`: redirect to the provider's consent page.
pub async fn sso_login(
    Extension(services): Extension<Arc<AppServices>>,
    Path(provider): Path<String>,
) -> axum::response::Response {
    match services.lifecycle.sso_login(&provider) {
        Ok(redirect) => (StatusCode::FOUND, [(header::LOCATION, redirect.url)]).into_response(),
        Err(err) => errors::rest_error_to_response(err),
    }
}

/// `GET /api/auth/:provider/callback`: finish the login and set the session cookie.
pub async fn callback(
    Extension(services): Extension<Arc<AppServices>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> axum::response::Response {
    if let Some(reason) = query.error {
        return errors::rest_error_to_response(RestError::bad_request(format!(
            "authorization refused by provider: {reason}"
        )));
    }

    match services
        .lifecycle
        .callback(&provider, &query.code, &query.state)
        .await
    {
        Ok(outcome) => {
            let cookie = cookies::session_cookie(&services.cookie, &outcome.session.access_token);
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(outcome.session),
            )
                .into_response()
        }
        Err(err) => errors::rest_error_to_response(err),
    }
}

/// `PUT /api/auth/:provider/renew-session`: refresh provider tokens for the
/// current session and reissue the cookie.
pub async fn renew_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(provider): Path<String>,
    session: Option<Extension<CurrentSession>>,
) -> axum::response::Response {
    let Some(Extension(CurrentSession(session))) = session else {
        return errors::rest_error_to_response(RestError::unauthorized(NO_ACTIVE_SESSION));
    };

    match services.lifecycle.renew(&provider, &session).await {
        Ok(renewed) => {
            let cookie = cookies::session_cookie(&services.cookie, &renewed.access_token);
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(renewed),
            )
                .into_response()
        }
        Err(err) => errors::rest_error_to_response(err),
    }
}

/// `POST /api/auth/logout`: revoke the current session and clear the cookie.
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    session: Option<Extension<CurrentSession>>,
) -> axum::response::Response {
    let Some(Extension(CurrentSession(session))) = session else {
        return errors::rest_error_to_response(RestError::unauthorized(NO_ACTIVE_SESSION));
    };

    match services.lifecycle.logout(&session).await {
        Ok(()) => {
            let cookie = cookies::cleared_cookie(&services.cookie);
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(json!({ "success": true })),
            )
                .into_response()
        }
        Err(err) => errors::rest_error_to_response(err),
    }
}
