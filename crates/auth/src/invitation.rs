use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use restohub_core::{InvitationId, RestError};

use crate::Role;

pub const INVITATION_REQUIRED: &str = "User is not registered or no valid invitation";

/// Admission ticket allowing an unregistered email to be provisioned.
///
/// An invitation is not consumed on use. It admits its email any number of
/// times until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: InvitationId,
    pub email: String,
    pub token: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Attributes for persisting a new invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvitation {
    pub email: String,
    pub token: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl NewInvitation {
    /// Invitation lifetime for a caller-supplied number of hours.
    pub fn lifetime_hours(hours: i64) -> Result<Duration, RestError> {
        Duration::try_hours(hours)
            .ok_or_else(|| RestError::validation("invitation lifetime is out of range"))
    }

    /// Issue an invitation valid for `ttl` from `now`, with a fresh random token.
    pub fn issue(
        email: impl Into<String>,
        role: Role,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, RestError> {
        let email = email.into().trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(RestError::validation("email must be a valid address"));
        }
        if ttl <= Duration::zero() {
            return Err(RestError::validation("invitation lifetime must be positive"));
        }

        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| RestError::validation("invitation lifetime is out of range"))?;

        Ok(Self {
            email,
            token: crate::pkce::random_token()?,
            role,
            expires_at,
        })
    }
}

/// Admit a lookup result: only a present, unexpired invitation passes.
pub fn admit(found: Option<Invitation>, now: DateTime<Utc>) -> Result<Invitation, RestError> {
    match found {
        Some(invitation) if invitation.is_valid(now) => Ok(invitation),
        _ => Err(RestError::forbidden(INVITATION_REQUIRED)),
    }
}
