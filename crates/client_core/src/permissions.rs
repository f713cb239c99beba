use std::collections::BTreeSet;

use shared::domain::{Permission, Role};

use crate::session::Session;

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::TeamsView,
    Permission::TeamsManage,
    Permission::PlayersView,
    Permission::PlayersManage,
    Permission::TournamentsView,
    Permission::TournamentsManage,
    Permission::UsersView,
    Permission::UsersManage,
    Permission::ReportsExport,
];

const VOCAL_PERMISSIONS: &[Permission] = &[
    Permission::TeamsView,
    Permission::TeamsManage,
    Permission::PlayersView,
    Permission::PlayersManage,
    Permission::TournamentsView,
];

const USER_PERMISSIONS: &[Permission] = &[
    Permission::TeamsView,
    Permission::PlayersView,
    Permission::TournamentsView,
];

pub fn permissions_for_role(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Vocal => VOCAL_PERMISSIONS,
        Role::User => USER_PERMISSIONS,
    }
}

/// Permissions granted to the current session. Derived on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    granted: BTreeSet<Permission>,
}

impl Permissions {
    pub fn for_role(role: Role) -> Self {
        Self {
            granted: permissions_for_role(role).iter().copied().collect(),
        }
    }

    /// Empty when nobody is signed in.
    pub fn for_session(session: &Session) -> Self {
        session
            .user()
            .map(|user| Self::for_role(user.role))
            .unwrap_or_default()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.granted.contains(p))
    }

    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.granted.contains(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.granted.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }
}
