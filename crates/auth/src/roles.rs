use core::str::FromStr;

use serde::{Deserialize, Serialize};

use gatekeeper_core::DomainError;

/// The single role a principal holds.
///
/// Closed set: every principal has exactly one role and the role is also its
/// only granted authority.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
    Doctor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::Doctor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Doctor => "DOCTOR",
        }
    }

    /// Authority string granted by this role (`ROLE_*`).
    pub fn authority(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
            Role::Doctor => "ROLE_DOCTOR",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    /// Accepts `USER`, `user` and `ROLE_USER` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let name = normalized.strip_prefix("ROLE_").unwrap_or(&normalized);
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == name)
            .ok_or_else(|| DomainError::validation(format!("unknown role '{s}'")))
    }
}
