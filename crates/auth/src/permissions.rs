//! Static role to permission table.
//!
//! Resource kinds and actions are closed enums and the table is a `match`, so
//! an unknown (role, kind, action) combination cannot be expressed at all and a
//! missing arm is a compile error.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use restohub_core::RestError;

use crate::Role;

/// Category of protected entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Restaurants,
    Users,
    Invitations,
    Pages,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Restaurants,
        ResourceKind::Users,
        ResourceKind::Invitations,
        ResourceKind::Pages,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Restaurants => "restaurants",
            ResourceKind::Users => "users",
            ResourceKind::Invitations => "invitations",
            ResourceKind::Pages => "pages",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RestError::bad_request(format!("unknown resource kind '{s}'")))
    }
}

/// Operation requested on a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    AccessCollection,
    #[serde(alias = "accessMember")]
    Access,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::AccessCollection,
        Action::Access,
        Action::Create,
        Action::Update,
        Action::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::AccessCollection => "accessCollection",
            Action::Access => "access",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accessCollection" => Ok(Action::AccessCollection),
            "access" | "accessMember" => Ok(Action::Access),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(RestError::bad_request(format!("unknown action '{other}'"))),
        }
    }
}

const COLLECTION_AND_READ: &[Action] = &[Action::AccessCollection, Action::Access, Action::Create];

/// Role-level grants. Decides collection actions on its own; member actions
/// are decided by the resource's ownership rules.
pub struct PermissionTable;

impl PermissionTable {
    /// Actions `role` may perform on `kind`. Public holds nothing.
    pub fn allowed(role: Role, kind: ResourceKind) -> &'static [Action] {
        match (role, kind) {
            (Role::Admin, _) => COLLECTION_AND_READ,
            (Role::Manager, ResourceKind::Restaurants) => &[Action::Access, Action::Create],
            (Role::Manager, ResourceKind::Users) => &[Action::Access],
            (Role::Manager, ResourceKind::Invitations) => &[],
            (Role::Manager, ResourceKind::Pages) => COLLECTION_AND_READ,
            (Role::Public, _) => &[],
        }
    }

    pub fn permits(role: Role, kind: ResourceKind, action: Action) -> bool {
        Self::allowed(role, kind).contains(&action)
    }

    /// Full grant map for a role, keyed by resource kind. Kinds with no grants
    /// are omitted.
    pub fn grants(role: Role) -> BTreeMap<ResourceKind, Vec<Action>> {
        ResourceKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let actions = Self::allowed(role, kind);
                (!actions.is_empty()).then(|| (kind, actions.to_vec()))
            })
            .collect()
    }
}
