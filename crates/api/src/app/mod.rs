//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and session lifecycle wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post, put},
};
use tower::ServiceBuilder;

use restohub_core::RestError;
use restohub_infra::AppConfig;

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router from configuration (entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, RestError> {
    let services = AppServices::from_config(config).await?;
    Ok(build_router(Arc::new(services)))
}

/// Build the router over already wired services.
pub fn build_router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        lifecycle: services.lifecycle.clone(),
        cookie_name: services.cookie.name.clone(),
    };

    // Protected routes: require a live session.
    let protected = Router::new()
        .route("/api/auth/:provider/renew-session", put(routes::auth::renew_session))
        .route("/api/auth/logout", post(routes::auth::logout))
        .nest("/api/admin/users", routes::users::router())
        .nest("/api/admin/invitations", routes::invitations::router())
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/api/auth/:provider", get(routes::auth::sso_login))
        .route("/api/auth/:provider/callback", get(routes::auth::callback))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
