//! Persistence ports for principals, sessions and invitations.
//!
//! Each port has an in-memory implementation (tests, local development) and a
//! Postgres implementation over `sqlx`.

use async_trait::async_trait;
use thiserror::Error;

use restohub_auth::{
    CollectionScope, Invitation, NewInvitation, NewPrincipal, NewSession, Principal, Session,
    SessionUpdate,
};
use restohub_core::{InvitationId, RestError, SessionId, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryInvitationStore, InMemoryPrincipalStore, InMemorySessionStore};
pub use postgres::{PgInvitationStore, PgPrincipalStore, PgSessionStore, ensure_schema};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<StoreError> for RestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => RestError::validation(msg),
            StoreError::NotFound => RestError::not_found("record not found"),
            StoreError::Backend(_) => RestError::internal("storage failure").with_cause(err),
        }
    }
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError>;

    /// Persist a new principal. Emails are unique.
    async fn create(&self, payload: NewPrincipal) -> Result<Principal, StoreError>;

    async fn list(&self, scope: &CollectionScope) -> Result<Vec<Principal>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Id(SessionId),
    AccessToken(String),
    RefreshToken(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: NewSession) -> Result<Session, StoreError>;

    /// Apply a partial update and return the stored row. Missing rows yield
    /// [`StoreError::NotFound`].
    async fn update_by_id(&self, id: SessionId, update: SessionUpdate) -> Result<Session, StoreError>;

    async fn find_one_by(&self, lookup: &SessionLookup) -> Result<Option<Session>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationLookup {
    Id(InvitationId),
    /// Most recently created invitation for the email.
    Email(String),
    Token(String),
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn find_by(&self, lookup: &InvitationLookup) -> Result<Option<Invitation>, StoreError>;

    async fn create(&self, payload: NewInvitation) -> Result<Invitation, StoreError>;

    /// Invitations carry no user owner, so `OwnedBy` yields nothing.
    async fn list(&self, scope: &CollectionScope) -> Result<Vec<Invitation>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use restohub_core::ErrorKind;

    #[test]
    fn store_errors_map_to_rest_kinds() {
        let conflict: RestError = StoreError::Conflict("Email must be unique".into()).into();
        assert_eq!(conflict.kind(), ErrorKind::ValidationError);
        assert_eq!(conflict.message(), "Email must be unique");

        let backend: RestError = StoreError::Backend("pool closed".into()).into();
        assert_eq!(backend.kind(), ErrorKind::InternalServerError);
        assert_eq!(backend.message(), "storage failure");
        assert_eq!(backend.causes(), ["storage failure: pool closed"]);
    }
}
