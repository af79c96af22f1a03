//! Infrastructure layer: configuration, persistence, identity provider client
//! and the SSO session lifecycle.

pub mod config;
pub mod identity_provider;
pub mod invitation_gate;
pub mod session_lifecycle;
pub mod store;
pub mod verifier_cache;

pub use config::{AppConfig, ConfigError, CookieSettings, SsoProvider, SsoProviderConfig};
pub use identity_provider::{
    IdentityProvider, OAuthClient, ProfileInfo, ProviderError, ProviderRegistry, TokenGrant,
};
pub use invitation_gate::InvitationGate;
pub use session_lifecycle::{
    AuthContext, CallbackOutcome, Clock, INVALID_LOGIN_STATE, LoginRedirect, PROVIDER_MISMATCH,
    RENEW_FAILED, SessionLifecycle, UNAUTHORISED,
};
pub use store::{
    InvitationLookup, InvitationStore, PrincipalStore, SessionLookup, SessionStore, StoreError,
};
pub use verifier_cache::{CacheError, InMemoryVerifierCache, PendingLogin, VerifierCache};
