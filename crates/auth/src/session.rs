use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restohub_core::{RestError, SessionId, UserId};

pub const SESSION_EXPIRED: &str = "Session expired";

/// A login session backed by provider-issued tokens.
///
/// A session is live while it has not been revoked and `now < expires_at`.
/// Logout sets `revoked_at` and moves `expires_at` to the revocation instant,
/// so the row is kept for auditing and stays distinguishable from an unknown token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub provider: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && now < self.expires_at
    }

    pub fn check_live(&self, now: DateTime<Utc>) -> Result<(), RestError> {
        if self.is_live(now) {
            Ok(())
        } else {
            Err(RestError::unauthorized(SESSION_EXPIRED))
        }
    }

    /// Apply a partial update in place. `None` fields are left untouched.
    pub fn apply(&mut self, update: &SessionUpdate, now: DateTime<Utc>) {
        if let Some(token) = &update.access_token {
            self.access_token = token.clone();
        }
        if let Some(token) = &update.refresh_token {
            self.refresh_token = token.clone();
        }
        if let Some(token) = &update.id_token {
            self.id_token = token.clone();
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(revoked_at) = update.revoked_at {
            self.revoked_at = Some(revoked_at);
        }
        self.updated_at = now;
    }
}

/// Attributes for persisting a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: UserId,
    pub provider: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Partial update of a stored session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    /// Replace the token set after a successful refresh grant. An absent id
    /// token keeps the stored one.
    pub fn renewal(
        access_token: String,
        refresh_token: String,
        id_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            id_token,
            expires_at: Some(expires_at),
            revoked_at: None,
        }
    }

    pub fn revocation(now: DateTime<Utc>) -> Self {
        Self {
            expires_at: Some(now),
            revoked_at: Some(now),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use restohub_core::ErrorKind;

    fn session(now: DateTime<Utc>) -> Session {
        Session {
            id: SessionId::new(1),
            user_id: UserId::new(2),
            provider: "google".into(),
            email: "a@example.com".into(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            id_token: "it".into(),
            expires_at: now + Duration::hours(1),
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn live_until_expiry_instant() {
        let now = Utc::now();
        let s = session(now);
        assert!(s.is_live(now));
        assert!(!s.is_live(s.expires_at));
        let err = s.check_live(s.expires_at).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), SESSION_EXPIRED);
    }

    #[test]
    fn revocation_kills_session_and_keeps_identity() {
        let now = Utc::now();
        let mut s = session(now);
        s.apply(&SessionUpdate::revocation(now), now);
        assert!(s.is_revoked());
        assert!(!s.is_live(now - Duration::minutes(1)));
        assert_eq!(s.id, SessionId::new(1));
        assert_eq!(s.access_token, "at");
    }

    #[test]
    fn renewal_without_id_token_keeps_previous() {
        let now = Utc::now();
        let mut s = session(now);
        let later = now + Duration::hours(2);
        s.apply(
            &SessionUpdate::renewal("at2".into(), "rt2".into(), None, later),
            now,
        );
        assert_eq!(s.access_token, "at2");
        assert_eq!(s.refresh_token, "rt2");
        assert_eq!(s.id_token, "it");
        assert_eq!(s.expires_at, later);
        assert_eq!(s.user_id, UserId::new(2));
    }
}
