use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use restohub_core::{RestaurantId, UserId};

use crate::{Action, PermissionTable, ResourceKind, Role};

/// An authenticated user as seen by authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: String,
    pub restaurant_id: Option<RestaurantId>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    /// Role-level check, ignoring ownership.
    pub fn can(&self, action: Action, kind: ResourceKind) -> bool {
        PermissionTable::permits(self.role, kind, action)
    }

    pub fn grants(&self) -> BTreeMap<ResourceKind, Vec<Action>> {
        PermissionTable::grants(self.role)
    }
}

/// Attributes for provisioning a new principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrincipal {
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: String,
}
