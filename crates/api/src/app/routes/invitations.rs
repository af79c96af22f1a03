use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use restohub_auth::{Action, Authorize, InvitationAuthorizer, NewInvitation, Principal, Role};
use restohub_core::{InvitationId, RestError};
use restohub_infra::InvitationLookup;

use crate::app::errors;
use crate::app::routes::{respond, with_permissions};
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invitations).post(create_invitation))
        .route("/:id", get(get_invitation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: Role,
    /// Overrides the configured invitation lifetime.
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

pub async fn create_invitation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: Result<Json<CreateInvitationRequest>, JsonRejection>,
) -> axum::response::Response {
    match issue_invitation(&services, &user, body).await {
        Ok(body) => (StatusCode::CREATED, body).into_response(),
        Err(err) => errors::rest_error_to_response(err),
    }
}

pub async fn list_invitations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> axum::response::Response {
    respond(load_invitations(&services, &user).await)
}

pub async fn get_invitation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> axum::response::Response {
    respond(load_invitation(&services, &user, &id).await)
}

async fn issue_invitation(
    services: &AppServices,
    user: &Principal,
    body: Result<Json<CreateInvitationRequest>, JsonRejection>,
) -> Result<Json<Value>, RestError> {
    let permissions = InvitationAuthorizer::collection(user).authorize(Action::Create)?;
    let Json(body) = body.map_err(|e| RestError::bad_request("invalid json body").with_cause(e))?;

    let ttl = match body.expires_in_hours {
        Some(hours) => NewInvitation::lifetime_hours(hours)?,
        None => services.invitation_ttl,
    };
    let payload = NewInvitation::issue(body.email, body.role, ttl, Utc::now())?;
    let invitation = services.invitations.create(payload).await?;
    tracing::info!(invitation_id = %invitation.id, role = %invitation.role, "invitation issued");
    Ok(with_permissions(invitation, permissions))
}

async fn load_invitations(services: &AppServices, user: &Principal) -> Result<Json<Value>, RestError> {
    let authz = InvitationAuthorizer::collection(user);
    let permissions = authz.authorize(Action::AccessCollection)?;
    let invitations = services.invitations.list(&authz.collection_scope()).await?;
    Ok(with_permissions(invitations, permissions))
}

async fn load_invitation(
    services: &AppServices,
    user: &Principal,
    id: &str,
) -> Result<Json<Value>, RestError> {
    let id: InvitationId = id.parse()?;
    let invitation = services
        .invitations
        .find_by(&InvitationLookup::Id(id))
        .await?
        .ok_or_else(|| RestError::not_found(format!("Sorry, invitation with id {id} doesn't exist")))?;

    let permissions =
        InvitationAuthorizer::member(user, invitation.email.clone()).authorize(Action::Access)?;
    Ok(with_permissions(invitation, permissions))
}
