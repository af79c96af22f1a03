//! Single sign-on session lifecycle.
//!
//! `SessionLifecycle` orchestrates the provider client, the verifier cache, the
//! invitation gate and the principal/session stores:
//!
//! - `sso_login`: generate a PKCE verifier and state, remember the verifier,
//!   return the provider authorization URL
//! - `callback`: consume the verifier for the returned state, exchange the code,
//!   fetch the profile, find or provision the principal (provisioning requires a
//!   valid invitation), persist a session
//! - `renew`: refresh provider tokens for an existing session in place
//! - `logout`: revoke the session (the row is kept)
//! - `validate` / `resolve`: map a presented access token to a live session and
//!   its principal
//!
//! Provider failures are logged with detail and surfaced to callers as opaque
//! errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use restohub_auth::{
    NewSession, PkceVerifier, Principal, Session, SessionUpdate, new_login_state,
};
use restohub_core::RestError;

use crate::identity_provider::{ProviderError, ProviderRegistry};
use crate::invitation_gate::InvitationGate;
use crate::store::{InvitationStore, PrincipalStore, SessionLookup, SessionStore};
use crate::verifier_cache::{PendingLogin, VerifierCache};

pub const INVALID_LOGIN_STATE: &str = "Invalid or expired login state";
pub const RENEW_FAILED: &str = "Failed to renew session";
pub const UNAUTHORISED: &str = "Unauthorised Error";
pub const PROVIDER_MISMATCH: &str = "Session was not issued by this provider";

/// Source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub session: Session,
    pub principal: Principal,
    /// Whether the principal was created by this callback.
    pub provisioned: bool,
}

/// Authenticated request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub principal: Principal,
    pub session: Session,
}

pub struct SessionLifecycle {
    providers: ProviderRegistry,
    verifiers: Arc<dyn VerifierCache>,
    principals: Arc<dyn PrincipalStore>,
    sessions: Arc<dyn SessionStore>,
    gate: InvitationGate,
    clock: Clock,
}

impl SessionLifecycle {
    pub fn new(
        providers: ProviderRegistry,
        verifiers: Arc<dyn VerifierCache>,
        principals: Arc<dyn PrincipalStore>,
        sessions: Arc<dyn SessionStore>,
        invitations: Arc<dyn InvitationStore>,
    ) -> Self {
        Self {
            providers,
            verifiers,
            principals,
            sessions,
            gate: InvitationGate::new(invitations),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    #[instrument(skip(self))]
    pub fn sso_login(&self, provider: &str) -> Result<LoginRedirect, RestError> {
        let idp = self.providers.resolve(provider)?;
        let verifier = PkceVerifier::generate()?;
        let state = new_login_state();

        let url = idp
            .authorization_url(&state, &verifier.challenge())
            .map_err(|e| provider_failure(provider, "authorization url", e))?;
        self.verifiers
            .set(&state, PendingLogin::new(idp.name(), verifier))
            .map_err(|e| {
                error!(error = %e, "failed to store login verifier");
                RestError::internal("Failed to start login").with_cause(e)
            })?;

        info!("sso login started");
        Ok(LoginRedirect { url, state })
    }

    #[instrument(skip(self, code, state))]
    pub async fn callback(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<CallbackOutcome, RestError> {
        if code.trim().is_empty() {
            return Err(RestError::bad_request("code is required"));
        }
        if state.trim().is_empty() {
            return Err(RestError::bad_request("state is required"));
        }

        let idp = self.providers.resolve(provider)?;
        let pending = self.verifiers.take(state).map_err(|e| {
            warn!(error = %e, "login state rejected");
            RestError::unauthorized(INVALID_LOGIN_STATE)
        })?;
        if pending.provider != idp.name() {
            warn!(issued_for = %pending.provider, "login state presented to another provider");
            return Err(RestError::unauthorized(INVALID_LOGIN_STATE));
        }
        let verifier = pending.verifier;

        let grant = idp
            .exchange_code(code, &verifier)
            .await
            .map_err(|e| provider_failure(provider, "token exchange", e))?;
        let profile = idp
            .fetch_profile(&grant.access_token)
            .await
            .map_err(|e| provider_failure(provider, "profile fetch", e))?;
        if profile.email.trim().is_empty() {
            error!("identity provider returned a profile without email");
            return Err(RestError::internal("SSO profile fetch failed"));
        }

        let now = self.now();
        let (principal, provisioned) = match self.principals.find_by_email(&profile.email).await? {
            Some(principal) => (principal, false),
            None => {
                let invitation = self.gate.validate(&profile.email, now).await?;
                let principal = self
                    .principals
                    .create(profile.into_new_principal(invitation.role))
                    .await?;
                info!(user_id = %principal.id, role = %principal.role, "principal provisioned from invitation");
                (principal, true)
            }
        };

        let session = self
            .sessions
            .create(NewSession {
                user_id: principal.id,
                provider: idp.name().to_string(),
                email: principal.email.clone(),
                access_token: grant.access_token,
                refresh_token: grant.refresh_token.unwrap_or_default(),
                id_token: grant.id_token.unwrap_or_default(),
                expires_at: grant.expires_at,
            })
            .await?;

        info!(user_id = %principal.id, session_id = %session.id, "session created");
        Ok(CallbackOutcome {
            session,
            principal,
            provisioned,
        })
    }

    /// Refresh the provider tokens of `session`. The session keeps its id and
    /// user; the stored row is untouched when the provider refuses.
    ///
    /// `provider` must be the one that issued the session.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn renew(&self, provider: &str, session: &Session) -> Result<Session, RestError> {
        if session.is_revoked() {
            return Err(RestError::unauthorized(restohub_auth::SESSION_EXPIRED));
        }
        let idp = self.providers.resolve(provider)?;
        if idp.name() != session.provider {
            warn!(issued_by = %session.provider, "renewal requested through another provider");
            return Err(RestError::bad_request(PROVIDER_MISMATCH));
        }
        if session.refresh_token.is_empty() {
            warn!("session has no refresh token");
            return Err(RestError::unauthorized(RENEW_FAILED));
        }

        let grant = idp.refresh(&session.refresh_token).await.map_err(|e| {
            warn!(error = %e, "token refresh refused");
            RestError::unauthorized(RENEW_FAILED)
        })?;

        let update = SessionUpdate::renewal(
            grant.access_token,
            grant
                .refresh_token
                .unwrap_or_else(|| session.refresh_token.clone()),
            grant.id_token,
            grant.expires_at,
        );
        let renewed = self.sessions.update_by_id(session.id, update).await?;
        info!("session renewed");
        Ok(renewed)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn logout(&self, session: &Session) -> Result<(), RestError> {
        self.sessions
            .update_by_id(session.id, SessionUpdate::revocation(self.now()))
            .await?;
        info!("session revoked");
        Ok(())
    }

    /// Map an access token to its session. Unknown tokens and expired or
    /// revoked sessions are both `Unauthorized`, with distinct messages.
    pub async fn validate(&self, access_token: &str) -> Result<Session, RestError> {
        if access_token.is_empty() {
            return Err(RestError::unauthorized(UNAUTHORISED));
        }
        let session = self
            .sessions
            .find_one_by(&SessionLookup::AccessToken(access_token.to_string()))
            .await?
            .ok_or_else(|| RestError::unauthorized(UNAUTHORISED))?;
        session.check_live(self.now())?;
        Ok(session)
    }

    /// Validate the token and load the session's principal.
    pub async fn resolve(&self, access_token: &str) -> Result<AuthContext, RestError> {
        let session = self.validate(access_token).await?;
        let principal = self
            .principals
            .get_by_id(session.user_id)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %session.user_id, "session refers to a missing user");
                RestError::unauthorized(UNAUTHORISED)
            })?;
        Ok(AuthContext { principal, session })
    }
}

fn provider_failure(provider: &str, stage: &str, err: ProviderError) -> RestError {
    error!(%provider, stage, error = %err, "identity provider call failed");
    RestError::internal(format!("SSO {stage} failed")).with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::Duration;

    use restohub_auth::{INVITATION_REQUIRED, NewInvitation, NewPrincipal, Role, SESSION_EXPIRED};
    use restohub_core::ErrorKind;

    use crate::config::SsoProvider;
    use crate::identity_provider::{IdentityProvider, ProfileInfo, TokenGrant};
    use crate::store::{InMemoryInvitationStore, InMemoryPrincipalStore, InMemorySessionStore};
    use crate::verifier_cache::InMemoryVerifierCache;

    /// Scripted provider: the code is the email, tokens are numbered per grant.
    #[derive(Default)]
    struct FakeProvider {
        grants: AtomicUsize,
        exchange_calls: AtomicUsize,
        refresh_fails: bool,
        last_verifier: Mutex<Option<String>>,
        refreshed: Mutex<Vec<String>>,
        /// Registered name; `google` when unset.
        label: Option<&'static str>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn name(&self) -> &str {
            self.label.unwrap_or("google")
        }

        fn authorization_url(&self, state: &str, challenge: &str) -> Result<String, ProviderError> {
            Ok(format!("https://idp.test/authorize?state={state}&code_challenge={challenge}"))
        }

        async fn exchange_code(
            &self,
            code: &str,
            verifier: &PkceVerifier,
        ) -> Result<TokenGrant, ProviderError> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_verifier.lock().unwrap() = Some(verifier.as_str().to_string());
            if code == "bad-code" {
                return Err(ProviderError::Exchange("invalid_grant".into()));
            }
            let n = self.grants.fetch_add(1, Ordering::SeqCst);
            Ok(TokenGrant {
                access_token: format!("{code}|access-{n}"),
                refresh_token: Some(format!("refresh-{n}")),
                id_token: Some(format!("id-{n}")),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }

        async fn fetch_profile(&self, access_token: &str) -> Result<ProfileInfo, ProviderError> {
            let email = access_token.split('|').next().unwrap_or_default().to_string();
            Ok(ProfileInfo {
                sub: email.clone(),
                email,
                given_name: "Given".into(),
                family_name: "Family".into(),
                picture: String::new(),
            })
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
            self.refreshed.lock().unwrap().push(refresh_token.to_string());
            if self.refresh_fails {
                return Err(ProviderError::Refresh("invalid_grant".into()));
            }
            let n = self.grants.fetch_add(1, Ordering::SeqCst);
            Ok(TokenGrant {
                access_token: format!("renewed-{n}"),
                refresh_token: None,
                id_token: None,
                expires_at: Utc::now() + Duration::hours(2),
            })
        }
    }

    struct Harness {
        lifecycle: SessionLifecycle,
        provider: Arc<FakeProvider>,
        authentik: Arc<FakeProvider>,
        principals: Arc<InMemoryPrincipalStore>,
        sessions: Arc<InMemorySessionStore>,
        invitations: Arc<InMemoryInvitationStore>,
    }

    fn harness(provider: FakeProvider) -> Harness {
        let provider = Arc::new(provider);
        let authentik = Arc::new(FakeProvider {
            label: Some("authentik"),
            ..FakeProvider::default()
        });
        let principals = Arc::new(InMemoryPrincipalStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let invitations = Arc::new(InMemoryInvitationStore::new());
        let lifecycle = SessionLifecycle::new(
            ProviderRegistry::new()
                .with(SsoProvider::Google, provider.clone())
                .with(SsoProvider::Authentik, authentik.clone()),
            Arc::new(InMemoryVerifierCache::new(StdDuration::from_secs(60))),
            principals.clone(),
            sessions.clone(),
            invitations.clone(),
        );
        Harness {
            lifecycle,
            provider,
            authentik,
            principals,
            sessions,
            invitations,
        }
    }

    async fn seed_user(h: &Harness, email: &str, role: Role) -> Principal {
        h.principals
            .create(NewPrincipal {
                email: email.into(),
                role,
                first_name: String::new(),
                last_name: String::new(),
                avatar_url: String::new(),
            })
            .await
            .unwrap()
    }

    async fn login(h: &Harness, email: &str) -> Result<CallbackOutcome, RestError> {
        let redirect = h.lifecycle.sso_login("google")?;
        h.lifecycle.callback("google", email, &redirect.state).await
    }

    #[tokio::test]
    async fn login_redirect_carries_state_and_challenge() {
        let h = harness(FakeProvider::default());
        let redirect = h.lifecycle.sso_login("google").unwrap();
        assert!(redirect.url.contains(&format!("state={}", redirect.state)));
        assert!(redirect.url.contains("code_challenge="));
    }

    #[tokio::test]
    async fn unknown_provider_is_bad_request() {
        let h = harness(FakeProvider::default());
        let err = h.lifecycle.sso_login("github").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn callback_for_registered_user_creates_session() {
        let h = harness(FakeProvider::default());
        let admin = seed_user(&h, "admin@example.com", Role::Admin).await;

        let outcome = login(&h, "admin@example.com").await.unwrap();
        assert!(!outcome.provisioned);
        assert_eq!(outcome.principal, admin);
        assert_eq!(outcome.session.user_id, admin.id);
        assert_eq!(outcome.session.provider, "google");
        assert_eq!(outcome.session.refresh_token, "refresh-0");

        let ctx = h.lifecycle.resolve(&outcome.session.access_token).await.unwrap();
        assert_eq!(ctx.principal.id, admin.id);
    }

    #[tokio::test]
    async fn callback_passes_stored_verifier_and_consumes_it() {
        let h = harness(FakeProvider::default());
        seed_user(&h, "admin@example.com", Role::Admin).await;

        let redirect = h.lifecycle.sso_login("google").unwrap();
        h.lifecycle
            .callback("google", "admin@example.com", &redirect.state)
            .await
            .unwrap();

        let verifier = h.provider.last_verifier.lock().unwrap().clone().unwrap();
        let challenge = PkceVerifier::from_string(verifier).challenge();
        assert!(redirect.url.ends_with(&format!("code_challenge={challenge}")));

        let replay = h
            .lifecycle
            .callback("google", "admin@example.com", &redirect.state)
            .await
            .unwrap_err();
        assert_eq!(replay.kind(), ErrorKind::Unauthorized);
        assert_eq!(replay.message(), INVALID_LOGIN_STATE);
    }

    #[tokio::test]
    async fn unknown_state_never_reaches_provider() {
        let h = harness(FakeProvider::default());
        let err = h
            .lifecycle
            .callback("google", "admin@example.com", "never-issued")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(h.provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_code_is_bad_request() {
        let h = harness(FakeProvider::default());
        let err = h.lifecycle.callback("google", "", "state").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn expired_invitation_blocks_provisioning() {
        let h = harness(FakeProvider::default());
        h.invitations
            .create(NewInvitation {
                email: "late@example.com".into(),
                token: "t".into(),
                role: Role::Manager,
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();

        let err = login(&h, "late@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.message(), INVITATION_REQUIRED);
        assert!(h.principals.find_by_email("late@example.com").await.unwrap().is_none());
        assert!(
            h.sessions
                .find_one_by(&SessionLookup::AccessToken("late@example.com|access-0".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn valid_invitation_provisions_with_invited_role() {
        let h = harness(FakeProvider::default());
        h.invitations
            .create(NewInvitation {
                email: "new@example.com".into(),
                token: "t".into(),
                role: Role::Manager,
                expires_at: Utc::now() + Duration::days(1),
            })
            .await
            .unwrap();

        let outcome = login(&h, "new@example.com").await.unwrap();
        assert!(outcome.provisioned);
        assert_eq!(outcome.principal.role, Role::Manager);
        assert_eq!(outcome.principal.first_name, "Given");

        let again = login(&h, "new@example.com").await.unwrap();
        assert!(!again.provisioned);
        assert_eq!(again.principal.id, outcome.principal.id);
    }

    #[tokio::test]
    async fn provider_exchange_failure_is_opaque_internal_error() {
        let h = harness(FakeProvider::default());
        let err = login(&h, "bad-code").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalServerError);
        assert_eq!(err.message(), "SSO token exchange failed");
    }

    #[tokio::test]
    async fn failed_refresh_leaves_session_untouched() {
        let h = harness(FakeProvider {
            refresh_fails: true,
            ..FakeProvider::default()
        });
        seed_user(&h, "admin@example.com", Role::Admin).await;
        let session = login(&h, "admin@example.com").await.unwrap().session;

        let err = h.lifecycle.renew("google", &session).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), RENEW_FAILED);

        let stored = h
            .sessions
            .find_one_by(&SessionLookup::Id(session.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn renewal_keeps_identity_and_refresh_token() {
        let h = harness(FakeProvider::default());
        seed_user(&h, "admin@example.com", Role::Admin).await;
        let session = login(&h, "admin@example.com").await.unwrap().session;

        let renewed = h.lifecycle.renew("google", &session).await.unwrap();
        assert_eq!(renewed.id, session.id);
        assert_eq!(renewed.user_id, session.user_id);
        assert_eq!(renewed.access_token, "renewed-1");
        assert_eq!(renewed.refresh_token, session.refresh_token);
        assert_eq!(renewed.id_token, session.id_token);
        assert!(renewed.expires_at > session.expires_at);

        assert!(h.lifecycle.validate(&session.access_token).await.is_err());
        assert!(h.lifecycle.validate("renewed-1").await.is_ok());
    }

    #[tokio::test]
    async fn logout_makes_token_expired_not_unknown() {
        let h = harness(FakeProvider::default());
        seed_user(&h, "admin@example.com", Role::Admin).await;
        let session = login(&h, "admin@example.com").await.unwrap().session;

        h.lifecycle.logout(&session).await.unwrap();

        let err = h.lifecycle.validate(&session.access_token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), SESSION_EXPIRED);

        let revoked = h
            .sessions
            .find_one_by(&SessionLookup::Id(session.id))
            .await
            .unwrap()
            .unwrap();
        assert!(revoked.is_revoked());
        assert!(h.lifecycle.renew("google", &revoked).await.is_err());
    }

    #[tokio::test]
    async fn validate_rejects_unknown_and_expired_tokens() {
        let h = harness(FakeProvider::default());
        let err = h.lifecycle.validate("nope").await.unwrap_err();
        assert_eq!(err.message(), UNAUTHORISED);

        seed_user(&h, "admin@example.com", Role::Admin).await;
        let session = login(&h, "admin@example.com").await.unwrap().session;
        let later = session.expires_at;
        let lifecycle = harness_clock(h, later);
        let err = lifecycle.validate(&session.access_token).await.unwrap_err();
        assert_eq!(err.message(), SESSION_EXPIRED);
    }

    fn harness_clock(h: Harness, at: DateTime<Utc>) -> SessionLifecycle {
        h.lifecycle.with_clock(Arc::new(move || at))
    }

    #[tokio::test]
    async fn state_is_bound_to_the_provider_that_issued_it() {
        let h = harness(FakeProvider::default());
        seed_user(&h, "admin@example.com", Role::Admin).await;

        let redirect = h.lifecycle.sso_login("google").unwrap();
        let err = h
            .lifecycle
            .callback("authentik", "admin@example.com", &redirect.state)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), INVALID_LOGIN_STATE);
        assert_eq!(h.authentik.exchange_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.provider.exchange_calls.load(Ordering::SeqCst), 0);

        // The state was consumed by the rejected attempt.
        let err = h
            .lifecycle
            .callback("google", "admin@example.com", &redirect.state)
            .await
            .unwrap_err();
        assert_eq!(err.message(), INVALID_LOGIN_STATE);
        assert_eq!(h.provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renewal_through_another_provider_is_refused() {
        let h = harness(FakeProvider::default());
        seed_user(&h, "admin@example.com", Role::Admin).await;
        let outcome = login(&h, "admin@example.com").await.unwrap();
        assert_eq!(outcome.session.provider, "google");

        let err = h
            .lifecycle
            .renew("authentik", &outcome.session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), PROVIDER_MISMATCH);
        assert!(h.authentik.refreshed.lock().unwrap().is_empty());

        let stored = h
            .sessions
            .find_one_by(&SessionLookup::Id(outcome.session.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, outcome.session);

        let renewed = h.lifecycle.renew("google", &outcome.session).await.unwrap();
        assert_eq!(renewed.id, outcome.session.id);
        assert_eq!(
            *h.provider.refreshed.lock().unwrap(),
            vec![outcome.session.refresh_token.clone()]
        );
    }
}
