use std::sync::Arc;

use axum::{extract::Request, extract::State, middleware::Next, response::Response};

use restohub_core::RestError;
use restohub_infra::{SessionLifecycle, UNAUTHORISED};

use crate::app::errors;
use crate::context::{CurrentSession, CurrentUser};
use crate::cookies;

#[derive(Clone)]
pub struct AuthState {
    pub lifecycle: Arc<SessionLifecycle>,
    pub cookie_name: String,
}

/// Resolve the session token to a live session and its principal, and expose
/// both to handlers as request extensions. Rejects with 401 otherwise.
pub async fn require_auth(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let Some(token) = cookies::session_token(req.headers(), &state.cookie_name) else {
        return errors::rest_error_to_response(RestError::unauthorized(UNAUTHORISED));
    };

    match state.lifecycle.resolve(&token).await {
        Ok(ctx) => {
            req.extensions_mut().insert(CurrentUser(ctx.principal));
            req.extensions_mut().insert(CurrentSession(ctx.session));
            next.run(req).await
        }
        Err(err) => errors::rest_error_to_response(err),
    }
}
