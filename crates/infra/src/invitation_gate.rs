use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use restohub_auth::{Invitation, admit};
use restohub_core::RestError;

use crate::store::{InvitationLookup, InvitationStore};

/// Admission check for emails that have no principal yet.
#[derive(Clone)]
pub struct InvitationGate {
    invitations: Arc<dyn InvitationStore>,
}

impl InvitationGate {
    pub fn new(invitations: Arc<dyn InvitationStore>) -> Self {
        Self { invitations }
    }

    /// Return the most recent invitation for `email` if it is still valid at `now`.
    /// The invitation is not consumed.
    pub async fn validate(&self, email: &str, now: DateTime<Utc>) -> Result<Invitation, RestError> {
        let found = self
            .invitations
            .find_by(&InvitationLookup::Email(email.to_string()))
            .await?;
        admit(found, now).inspect_err(|_| warn!(%email, "sign-in refused: no valid invitation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInvitationStore;
    use chrono::Duration;
    use restohub_auth::{INVITATION_REQUIRED, NewInvitation, Role};
    use restohub_core::ErrorKind;

    async fn gate_with(expires_in: Duration) -> (InvitationGate, DateTime<Utc>) {
        let now = Utc::now();
        let store = Arc::new(InMemoryInvitationStore::new());
        store
            .create(NewInvitation {
                email: "new@example.com".into(),
                token: "tok".into(),
                role: Role::Manager,
                expires_at: now + expires_in,
            })
            .await
            .unwrap();
        (InvitationGate::new(store), now)
    }

    #[tokio::test]
    async fn valid_invitation_admits_repeatedly() {
        let (gate, now) = gate_with(Duration::hours(1)).await;
        let first = gate.validate("new@example.com", now).await.unwrap();
        let second = gate.validate("new@example.com", now).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.role, Role::Manager);
    }

    #[tokio::test]
    async fn expired_invitation_is_forbidden() {
        let (gate, now) = gate_with(-Duration::seconds(1)).await;
        let err = gate.validate("new@example.com", now).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.message(), INVITATION_REQUIRED);
    }

    #[tokio::test]
    async fn unknown_email_is_forbidden() {
        let (gate, now) = gate_with(Duration::hours(1)).await;
        let err = gate.validate("stranger@example.com", now).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
