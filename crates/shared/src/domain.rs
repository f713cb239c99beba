use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Vocal,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Vocal => "VOCAL",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account as returned by the identity endpoints. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    TeamsView,
    TeamsManage,
    PlayersView,
    PlayersManage,
    TournamentsView,
    TournamentsManage,
    UsersView,
    UsersManage,
    ReportsExport,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::TeamsView => "teams_view",
            Permission::TeamsManage => "teams_manage",
            Permission::PlayersView => "players_view",
            Permission::PlayersManage => "players_manage",
            Permission::TournamentsView => "tournaments_view",
            Permission::TournamentsManage => "tournaments_manage",
            Permission::UsersView => "users_view",
            Permission::UsersManage => "users_manage",
            Permission::ReportsExport => "reports_export",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
