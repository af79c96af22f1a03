use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use restohub_auth::{
    CollectionScope, Invitation, NewInvitation, NewPrincipal, NewSession, Principal, Session,
    SessionUpdate,
};
use restohub_core::{InvitationId, SessionId, UserId};

use super::{
    InvitationLookup, InvitationStore, PrincipalStore, SessionLookup, SessionStore, StoreError,
};

/// Rows keyed by a sequence-assigned id.
#[derive(Debug)]
struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory principal store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    inner: RwLock<Table<Principal>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let table = self.inner.read().map_err(|_| poisoned())?;
        Ok(table.rows.values().find(|p| p.email == email).cloned())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        let table = self.inner.read().map_err(|_| poisoned())?;
        Ok(table.rows.get(&id.get()).cloned())
    }

    async fn create(&self, payload: NewPrincipal) -> Result<Principal, StoreError> {
        let mut table = self.inner.write().map_err(|_| poisoned())?;
        if table.rows.values().any(|p| p.email == payload.email) {
            return Err(StoreError::Conflict("Email must be unique".to_string()));
        }

        let id = table.next_id();
        let principal = Principal {
            id: UserId::new(id),
            email: payload.email,
            role: payload.role,
            first_name: payload.first_name,
            last_name: payload.last_name,
            avatar_url: payload.avatar_url,
            restaurant_id: None,
        };
        table.rows.insert(id, principal.clone());
        Ok(principal)
    }

    async fn list(&self, scope: &CollectionScope) -> Result<Vec<Principal>, StoreError> {
        let table = self.inner.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .values()
            .filter(|p| scope.admits(p.id))
            .cloned()
            .collect())
    }
}

/// In-memory session store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<Table<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut table = self.inner.write().map_err(|_| poisoned())?;
        let id = table.next_id();
        let now = Utc::now();
        let stored = Session {
            id: SessionId::new(id),
            user_id: session.user_id,
            provider: session.provider,
            email: session.email,
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            id_token: session.id_token,
            expires_at: session.expires_at,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_by_id(&self, id: SessionId, update: SessionUpdate) -> Result<Session, StoreError> {
        let mut table = self.inner.write().map_err(|_| poisoned())?;
        let session = table.rows.get_mut(&id.get()).ok_or(StoreError::NotFound)?;
        session.apply(&update, Utc::now());
        Ok(session.clone())
    }

    async fn find_one_by(&self, lookup: &SessionLookup) -> Result<Option<Session>, StoreError> {
        let table = self.inner.read().map_err(|_| poisoned())?;
        let found = match lookup {
            SessionLookup::Id(id) => table.rows.get(&id.get()),
            SessionLookup::AccessToken(token) => {
                table.rows.values().find(|s| &s.access_token == token)
            }
            SessionLookup::RefreshToken(token) => {
                table.rows.values().find(|s| &s.refresh_token == token)
            }
        };
        Ok(found.cloned())
    }
}

/// In-memory invitation store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInvitationStore {
    inner: RwLock<Table<Invitation>>,
}

impl InMemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvitationStore for InMemoryInvitationStore {
    async fn find_by(&self, lookup: &InvitationLookup) -> Result<Option<Invitation>, StoreError> {
        let table = self.inner.read().map_err(|_| poisoned())?;
        let found = match lookup {
            InvitationLookup::Id(id) => table.rows.get(&id.get()),
            // Highest id is the most recent row.
            InvitationLookup::Email(email) => {
                table.rows.values().rev().find(|i| &i.email == email)
            }
            InvitationLookup::Token(token) => table.rows.values().find(|i| &i.token == token),
        };
        Ok(found.cloned())
    }

    async fn create(&self, payload: NewInvitation) -> Result<Invitation, StoreError> {
        let mut table = self.inner.write().map_err(|_| poisoned())?;
        let id = table.next_id();
        let now = Utc::now();
        let invitation = Invitation {
            id: InvitationId::new(id),
            email: payload.email,
            token: payload.token,
            role: payload.role,
            expires_at: payload.expires_at,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, invitation.clone());
        Ok(invitation)
    }

    async fn list(&self, scope: &CollectionScope) -> Result<Vec<Invitation>, StoreError> {
        let table = self.inner.read().map_err(|_| poisoned())?;
        match scope {
            CollectionScope::All => Ok(table.rows.values().cloned().collect()),
            CollectionScope::OwnedBy(_) | CollectionScope::Nothing => Ok(Vec::new()),
        }
    }
}
