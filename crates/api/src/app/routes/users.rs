use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};

use restohub_auth::{Action, Authorize, Principal, UserAuthorizer};
use restohub_core::{RestError, UserId};

use crate::app::routes::{respond, with_permissions};
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/profile", get(profile))
        .route("/:id", get(get_user))
}

/// Current principal with its role-level grants.
pub async fn profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> axum::response::Response {
    let grants = user.grants();
    Json(json!({
        "data": user,
        "meta": { "permissions": grants },
    }))
    .into_response()
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> axum::response::Response {
    respond(load_users(&services, &user).await)
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> axum::response::Response {
    respond(load_user(&services, &user, &id).await)
}

async fn load_users(services: &AppServices, user: &Principal) -> Result<Json<Value>, RestError> {
    let authz = UserAuthorizer::collection(user);
    let permissions = authz.authorize(Action::AccessCollection)?;
    let users = services.principals.list(&authz.collection_scope()).await?;
    Ok(with_permissions(users, permissions))
}

async fn load_user(services: &AppServices, user: &Principal, id: &str) -> Result<Json<Value>, RestError> {
    let id: UserId = id.parse()?;
    let target = services
        .principals
        .get_by_id(id)
        .await?
        .ok_or_else(|| RestError::not_found(format!("Sorry, user with id {id} doesn't exist")))?;

    let permissions = UserAuthorizer::member(user, target.id).authorize(Action::Access)?;
    Ok(with_permissions(target, permissions))
}
