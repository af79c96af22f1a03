use std::marker::PhantomData;

use serde::Serialize;
use thiserror::Error;

use restohub_core::{RestError, UserId};

use crate::{Action, PermissionTable, Principal, ResourceKind};

/// Message returned for every denied action.
pub const FORBIDDEN_MESSAGE: &str = "You are not allowed to perform this action";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("{}", FORBIDDEN_MESSAGE)]
    Forbidden { kind: ResourceKind, action: Action },

    /// The requested verb is not part of the action set. Denied like any other refusal.
    #[error("{}", FORBIDDEN_MESSAGE)]
    UnknownAction(String),
}

impl From<AuthzError> for RestError {
    fn from(err: AuthzError) -> Self {
        RestError::forbidden(err.to_string())
    }
}

/// Member-level outcome returned on success, used as response metadata.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_access: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

/// Which records of a kind a principal may list.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CollectionScope {
    All,
    OwnedBy(UserId),
    Nothing,
}

impl CollectionScope {
    pub fn admits(&self, owner: UserId) -> bool {
        match self {
            CollectionScope::All => true,
            CollectionScope::OwnedBy(id) => *id == owner,
            CollectionScope::Nothing => false,
        }
    }
}

/// Ownership rule deciding a member action. The role-level table only covers
/// collection actions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemberRule {
    AdminOnly,
    AdminOrOwningManager,
}

impl MemberRule {
    pub fn allows(self, principal: &Principal, owned: bool) -> bool {
        match self {
            MemberRule::AdminOnly => principal.is_admin(),
            MemberRule::AdminOrOwningManager => {
                principal.is_admin() || (principal.is_manager() && owned)
            }
        }
    }
}

/// Five-operation authorization contract.
///
/// Every failure is fail-closed: the provided [`Authorize::authorize`] returns
/// [`AuthzError`] unless the specific operation grants access.
pub trait Authorize {
    fn resource_kind(&self) -> ResourceKind;

    fn authorize_access_collection(&self) -> bool;
    fn authorize_create(&self) -> bool;
    fn authorize_access(&self) -> bool;
    fn authorize_update(&self) -> bool;
    fn authorize_delete(&self) -> bool;

    fn permissions(&self) -> Permissions {
        Permissions {
            can_access: self.authorize_access(),
            can_update: self.authorize_update(),
            can_delete: self.authorize_delete(),
        }
    }

    fn authorize(&self, action: Action) -> Result<Permissions, AuthzError> {
        let permissions = self.permissions();
        let granted = match action {
            Action::AccessCollection => self.authorize_access_collection(),
            Action::Create => self.authorize_create(),
            Action::Access => permissions.can_access,
            Action::Update => permissions.can_update,
            Action::Delete => permissions.can_delete,
        };

        if granted {
            Ok(permissions)
        } else {
            tracing::debug!(kind = %self.resource_kind(), %action, "authorization denied");
            Err(AuthzError::Forbidden {
                kind: self.resource_kind(),
                action,
            })
        }
    }

    /// Authorize a textual verb, as received from a request.
    fn authorize_verb(&self, verb: &str) -> Result<Permissions, AuthzError> {
        match verb.parse::<Action>() {
            Ok(action) => self.authorize(action),
            Err(_) => Err(AuthzError::UnknownAction(verb.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-kind policies
// ─────────────────────────────────────────────────────────────────────────────

/// Ownership predicate, member rules and collection scoping for one kind.
pub trait ResourcePolicy {
    const KIND: ResourceKind;
    const ACCESS: MemberRule;
    const UPDATE: MemberRule;
    const DELETE: MemberRule;

    /// Ownership attribute carried by a member resource.
    type Owner;

    fn owns(principal: &Principal, owner: &Self::Owner) -> bool;

    fn collection_scope(principal: &Principal) -> CollectionScope;
}

/// Restaurants are owned by their manager.
pub struct RestaurantPolicy;

impl ResourcePolicy for RestaurantPolicy {
    const KIND: ResourceKind = ResourceKind::Restaurants;
    const ACCESS: MemberRule = MemberRule::AdminOrOwningManager;
    const UPDATE: MemberRule = MemberRule::AdminOnly;
    const DELETE: MemberRule = MemberRule::AdminOnly;

    type Owner = UserId;

    fn owns(principal: &Principal, manager_id: &UserId) -> bool {
        principal.id == *manager_id
    }

    fn collection_scope(principal: &Principal) -> CollectionScope {
        owner_scoped(principal)
    }
}

/// A user resource is "owned" by the principal with the same id.
pub struct UserPolicy;

impl ResourcePolicy for UserPolicy {
    const KIND: ResourceKind = ResourceKind::Users;
    const ACCESS: MemberRule = MemberRule::AdminOrOwningManager;
    const UPDATE: MemberRule = MemberRule::AdminOnly;
    const DELETE: MemberRule = MemberRule::AdminOnly;

    type Owner = UserId;

    fn owns(principal: &Principal, user_id: &UserId) -> bool {
        principal.id == *user_id
    }

    fn collection_scope(principal: &Principal) -> CollectionScope {
        admin_only_scope(principal)
    }
}

/// Pages are owned by their author.
pub struct PagePolicy;

impl ResourcePolicy for PagePolicy {
    const KIND: ResourceKind = ResourceKind::Pages;
    const ACCESS: MemberRule = MemberRule::AdminOrOwningManager;
    const UPDATE: MemberRule = MemberRule::AdminOrOwningManager;
    const DELETE: MemberRule = MemberRule::AdminOrOwningManager;

    type Owner = UserId;

    fn owns(principal: &Principal, author_id: &UserId) -> bool {
        principal.id == *author_id
    }

    fn collection_scope(principal: &Principal) -> CollectionScope {
        owner_scoped(principal)
    }
}

/// Invitations are matched to principals by email. Ownership is informational;
/// every member action stays admin-only.
pub struct InvitationPolicy;

impl ResourcePolicy for InvitationPolicy {
    const KIND: ResourceKind = ResourceKind::Invitations;
    const ACCESS: MemberRule = MemberRule::AdminOnly;
    const UPDATE: MemberRule = MemberRule::AdminOnly;
    const DELETE: MemberRule = MemberRule::AdminOnly;

    type Owner = String;

    fn owns(principal: &Principal, email: &String) -> bool {
        principal.email == *email
    }

    fn collection_scope(principal: &Principal) -> CollectionScope {
        admin_only_scope(principal)
    }
}

fn owner_scoped(principal: &Principal) -> CollectionScope {
    if principal.is_admin() {
        CollectionScope::All
    } else if principal.is_manager() {
        CollectionScope::OwnedBy(principal.id)
    } else {
        CollectionScope::Nothing
    }
}

fn admin_only_scope(principal: &Principal) -> CollectionScope {
    if principal.is_admin() {
        CollectionScope::All
    } else {
        CollectionScope::Nothing
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic authorizer
// ─────────────────────────────────────────────────────────────────────────────

/// Authorizer for one resource kind, bound to a principal and optionally to a
/// member resource's ownership attribute.
///
/// Without an owner (collection or create requests) ownership is never assumed.
pub struct ResourceAuthorizer<'a, P: ResourcePolicy> {
    principal: &'a Principal,
    owner: Option<P::Owner>,
    _policy: PhantomData<P>,
}

pub type RestaurantAuthorizer<'a> = ResourceAuthorizer<'a, RestaurantPolicy>;
pub type UserAuthorizer<'a> = ResourceAuthorizer<'a, UserPolicy>;
pub type PageAuthorizer<'a> = ResourceAuthorizer<'a, PagePolicy>;
pub type InvitationAuthorizer<'a> = ResourceAuthorizer<'a, InvitationPolicy>;

impl<'a, P: ResourcePolicy> ResourceAuthorizer<'a, P> {
    pub fn collection(principal: &'a Principal) -> Self {
        Self {
            principal,
            owner: None,
            _policy: PhantomData,
        }
    }

    pub fn member(principal: &'a Principal, owner: P::Owner) -> Self {
        Self {
            principal,
            owner: Some(owner),
            _policy: PhantomData,
        }
    }

    pub fn principal(&self) -> &Principal {
        self.principal
    }

    pub fn owns_resource(&self) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|owner| P::owns(self.principal, owner))
    }

    pub fn collection_scope(&self) -> CollectionScope {
        P::collection_scope(self.principal)
    }

    fn member_check(&self, rule: MemberRule) -> bool {
        rule.allows(self.principal, self.owns_resource())
    }
}

impl<P: ResourcePolicy> Authorize for ResourceAuthorizer<'_, P> {
    fn resource_kind(&self) -> ResourceKind {
        P::KIND
    }

    fn authorize_access_collection(&self) -> bool {
        PermissionTable::permits(self.principal.role, P::KIND, Action::AccessCollection)
    }

    fn authorize_create(&self) -> bool {
        PermissionTable::permits(self.principal.role, P::KIND, Action::Create)
    }

    fn authorize_access(&self) -> bool {
        self.member_check(P::ACCESS)
    }

    fn authorize_update(&self) -> bool {
        self.member_check(P::UPDATE)
    }

    fn authorize_delete(&self) -> bool {
        self.member_check(P::DELETE)
    }
}
