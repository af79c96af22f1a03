//! `restohub-auth`: pure authorization and session primitives (no IO).
//!
//! - Closed role/resource/action enums and the static permission table
//! - Per-resource authorizers with ownership rules and collection scoping
//! - Session and invitation records with their liveness rules
//! - PKCE verifier/challenge generation

pub mod authorize;
pub mod invitation;
pub mod permissions;
pub mod pkce;
pub mod principal;
pub mod roles;
pub mod session;

pub use authorize::{
    Authorize, AuthzError, CollectionScope, FORBIDDEN_MESSAGE, InvitationAuthorizer,
    InvitationPolicy, MemberRule, PageAuthorizer, PagePolicy, Permissions, ResourceAuthorizer,
    ResourcePolicy, RestaurantAuthorizer, RestaurantPolicy, UserAuthorizer, UserPolicy,
};
pub use invitation::{INVITATION_REQUIRED, Invitation, NewInvitation, admit};
pub use permissions::{Action, PermissionTable, ResourceKind};
pub use pkce::{PkceVerifier, new_login_state, random_token};
pub use principal::{NewPrincipal, Principal};
pub use roles::Role;
pub use session::{NewSession, SESSION_EXPIRED, Session, SessionUpdate};
