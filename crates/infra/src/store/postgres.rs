//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` (constraint mapped to a readable message) |
//! | RowNotFound | N/A | `NotFound` |
//! | Any other | Any other | `Backend` |
//!
//! Rows are decoded by hand with `Row::try_get`; the crate builds sqlx without macros.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use restohub_auth::{
    CollectionScope, Invitation, NewInvitation, NewPrincipal, NewSession, Principal, Role, Session,
    SessionUpdate,
};
use restohub_core::{InvitationId, RestaurantId, SessionId, UserId};

use super::{
    InvitationLookup, InvitationStore, PrincipalStore, SessionLookup, SessionStore, StoreError,
};

/// Tables used by the stores. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    email TEXT NOT NULL CONSTRAINT users_email_key UNIQUE,
    role TEXT NOT NULL DEFAULT 'public',
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    avatar_url TEXT NOT NULL DEFAULT '',
    restaurant_id BIGINT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sessions (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users (id),
    provider TEXT NOT NULL,
    email TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL DEFAULT '',
    id_token TEXT NOT NULL DEFAULT '',
    expires_at TIMESTAMPTZ NOT NULL,
    revoked_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS sessions_access_token_idx ON sessions (access_token);
CREATE INDEX IF NOT EXISTS sessions_refresh_token_idx ON sessions (refresh_token);

CREATE TABLE IF NOT EXISTS invitations (
    id BIGSERIAL PRIMARY KEY,
    email TEXT NOT NULL,
    token TEXT NOT NULL CONSTRAINT invitations_token_key UNIQUE,
    role TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS invitations_email_idx ON invitations (email);
"#;

/// Create the tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

fn constraint_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_email_key") => "Email must be unique".to_string(),
        Some("invitations_token_key") => "Token must be unique".to_string(),
        Some(other) => format!("duplicate value violates {other}"),
        None => "duplicate value".to_string(),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict(constraint_message(db_err.constraint()))
            } else {
                StoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
            }
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

fn decode<T>(operation: &str, result: Result<T, sqlx::Error>) -> Result<T, StoreError> {
    result.map_err(|e| map_sqlx_error(operation, e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Principals
// ─────────────────────────────────────────────────────────────────────────────

const PRINCIPAL_COLUMNS: &str = "id, email, role, first_name, last_name, avatar_url, restaurant_id";

fn principal_from_row(row: &PgRow) -> Result<Principal, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<Role>()
        .map_err(|e| sqlx::Error::Decode(e.message().to_string().into()))?;
    Ok(Principal {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        role,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        avatar_url: row.try_get("avatar_url")?,
        restaurant_id: row
            .try_get::<Option<i64>, _>("restaurant_id")?
            .map(RestaurantId::new),
    })
}

#[derive(Debug, Clone)]
pub struct PgPrincipalStore {
    pool: Arc<PgPool>,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    #[instrument(skip(self), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let row = decode(
            "find_by_email",
            sqlx::query(&format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&*self.pool)
                .await,
        )?;
        row.as_ref()
            .map(principal_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_by_email", e))
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        let row = decode(
            "get_user",
            sqlx::query(&format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&*self.pool)
                .await,
        )?;
        row.as_ref()
            .map(principal_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_user", e))
    }

    #[instrument(skip(self, payload), fields(email = %payload.email), err)]
    async fn create(&self, payload: NewPrincipal) -> Result<Principal, StoreError> {
        let row = decode(
            "create_user",
            sqlx::query(&format!(
                "INSERT INTO users (email, role, first_name, last_name, avatar_url) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {PRINCIPAL_COLUMNS}"
            ))
            .bind(&payload.email)
            .bind(payload.role.as_str())
            .bind(&payload.first_name)
            .bind(&payload.last_name)
            .bind(&payload.avatar_url)
            .fetch_one(&*self.pool)
            .await,
        )?;
        principal_from_row(&row).map_err(|e| map_sqlx_error("create_user", e))
    }

    #[instrument(skip(self), err)]
    async fn list(&self, scope: &CollectionScope) -> Result<Vec<Principal>, StoreError> {
        let rows = match scope {
            CollectionScope::Nothing => return Ok(Vec::new()),
            CollectionScope::All => {
                sqlx::query(&format!("SELECT {PRINCIPAL_COLUMNS} FROM users ORDER BY id"))
                    .fetch_all(&*self.pool)
                    .await
            }
            CollectionScope::OwnedBy(owner) => {
                sqlx::query(&format!(
                    "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1 ORDER BY id"
                ))
                .bind(owner.get())
                .fetch_all(&*self.pool)
                .await
            }
        };
        decode("list_users", rows)?
            .iter()
            .map(principal_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_users", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

const SESSION_COLUMNS: &str = "id, user_id, provider, email, access_token, refresh_token, id_token, \
                               expires_at, revoked_at, created_at, updated_at";

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: SessionId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        provider: row.try_get("provider")?,
        email: row.try_get("email")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        id_token: row.try_get("id_token")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get::<Option<DateTime<Utc>>, _>("revoked_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: Arc<PgPool>,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id), err)]
    async fn create(&self, session: NewSession) -> Result<Session, StoreError> {
        let row = decode(
            "create_session",
            sqlx::query(&format!(
                "INSERT INTO sessions \
                 (user_id, provider, email, access_token, refresh_token, id_token, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SESSION_COLUMNS}"
            ))
            .bind(session.user_id.get())
            .bind(&session.provider)
            .bind(&session.email)
            .bind(&session.access_token)
            .bind(&session.refresh_token)
            .bind(&session.id_token)
            .bind(session.expires_at)
            .fetch_one(&*self.pool)
            .await,
        )?;
        session_from_row(&row).map_err(|e| map_sqlx_error("create_session", e))
    }

    #[instrument(skip(self, update), err)]
    async fn update_by_id(&self, id: SessionId, update: SessionUpdate) -> Result<Session, StoreError> {
        let row = decode(
            "update_session",
            sqlx::query(&format!(
                "UPDATE sessions SET \
                 access_token = COALESCE($2, access_token), \
                 refresh_token = COALESCE($3, refresh_token), \
                 id_token = COALESCE($4, id_token), \
                 expires_at = COALESCE($5, expires_at), \
                 revoked_at = COALESCE($6, revoked_at), \
                 updated_at = NOW() \
                 WHERE id = $1 RETURNING {SESSION_COLUMNS}"
            ))
            .bind(id.get())
            .bind(update.access_token)
            .bind(update.refresh_token)
            .bind(update.id_token)
            .bind(update.expires_at)
            .bind(update.revoked_at)
            .fetch_optional(&*self.pool)
            .await,
        )?;
        let row = row.ok_or(StoreError::NotFound)?;
        session_from_row(&row).map_err(|e| map_sqlx_error("update_session", e))
    }

    #[instrument(skip(self, lookup), err)]
    async fn find_one_by(&self, lookup: &SessionLookup) -> Result<Option<Session>, StoreError> {
        let result = match lookup {
            SessionLookup::Id(id) => {
                let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
                sqlx::query(&sql)
                    .bind(id.get())
                    .fetch_optional(&*self.pool)
                    .await
            }
            SessionLookup::AccessToken(token) => {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE access_token = $1 \
                     ORDER BY id DESC LIMIT 1"
                );
                sqlx::query(&sql)
                    .bind(token.as_str())
                    .fetch_optional(&*self.pool)
                    .await
            }
            SessionLookup::RefreshToken(token) => {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token = $1 \
                     ORDER BY id DESC LIMIT 1"
                );
                sqlx::query(&sql)
                    .bind(token.as_str())
                    .fetch_optional(&*self.pool)
                    .await
            }
        };
        let row = decode("find_session", result)?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_session", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invitations
// ─────────────────────────────────────────────────────────────────────────────

const INVITATION_COLUMNS: &str = "id, email, token, role, expires_at, created_at, updated_at";

fn invitation_from_row(row: &PgRow) -> Result<Invitation, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<Role>()
        .map_err(|e| sqlx::Error::Decode(e.message().to_string().into()))?;
    Ok(Invitation {
        id: InvitationId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        token: row.try_get("token")?,
        role,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PgInvitationStore {
    pool: Arc<PgPool>,
}

impl PgInvitationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl InvitationStore for PgInvitationStore {
    #[instrument(skip(self, lookup), err)]
    async fn find_by(&self, lookup: &InvitationLookup) -> Result<Option<Invitation>, StoreError> {
        let result = match lookup {
            InvitationLookup::Id(id) => {
                let sql = format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1");
                sqlx::query(&sql)
                    .bind(id.get())
                    .fetch_optional(&*self.pool)
                    .await
            }
            InvitationLookup::Email(email) => {
                let sql = format!(
                    "SELECT {INVITATION_COLUMNS} FROM invitations WHERE email = $1 \
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                );
                sqlx::query(&sql)
                    .bind(email.as_str())
                    .fetch_optional(&*self.pool)
                    .await
            }
            InvitationLookup::Token(token) => {
                let sql = format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = $1");
                sqlx::query(&sql)
                    .bind(token.as_str())
                    .fetch_optional(&*self.pool)
                    .await
            }
        };
        let row = decode("find_invitation", result)?;
        row.as_ref()
            .map(invitation_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_invitation", e))
    }

    #[instrument(skip(self, payload), fields(email = %payload.email), err)]
    async fn create(&self, payload: NewInvitation) -> Result<Invitation, StoreError> {
        let row = decode(
            "create_invitation",
            sqlx::query(&format!(
                "INSERT INTO invitations (email, token, role, expires_at) \
                 VALUES ($1, $2, $3, $4) RETURNING {INVITATION_COLUMNS}"
            ))
            .bind(&payload.email)
            .bind(&payload.token)
            .bind(payload.role.as_str())
            .bind(payload.expires_at)
            .fetch_one(&*self.pool)
            .await,
        )?;
        invitation_from_row(&row).map_err(|e| map_sqlx_error("create_invitation", e))
    }

    #[instrument(skip(self), err)]
    async fn list(&self, scope: &CollectionScope) -> Result<Vec<Invitation>, StoreError> {
        if *scope != CollectionScope::All {
            return Ok(Vec::new());
        }
        let rows = decode(
            "list_invitations",
            sqlx::query(&format!(
                "SELECT {INVITATION_COLUMNS} FROM invitations ORDER BY id"
            ))
            .fetch_all(&*self.pool)
            .await,
        )?;
        rows.iter()
            .map(invitation_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_invitations", e))
    }
}
