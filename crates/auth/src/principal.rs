use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatekeeper_core::PrincipalId;

use crate::Role;

/// Identity record of a user account, as persisted.
///
/// `email` is the unique, case-sensitive login name and the subject of every
/// token minted for this principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    /// False until the account is activated.
    pub enabled: bool,
    pub account_non_locked: bool,
    pub failed_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// Identity + authority projection attached to authenticated requests.
    pub fn identity(&self) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }

    pub fn is_locked(&self) -> bool {
        !self.account_non_locked
    }

    /// Count one failed login; locks the account once `threshold` is reached.
    ///
    /// Returns `true` when this attempt locked the account.
    pub fn record_failed_attempt(&mut self, threshold: u32) -> bool {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        if self.failed_attempts >= threshold {
            self.account_non_locked = false;
            return true;
        }
        false
    }

    pub fn lock(&mut self) {
        self.account_non_locked = false;
    }

    /// Unlocking also clears the failure counter.
    pub fn unlock(&mut self) {
        self.account_non_locked = true;
        self.failed_attempts = 0;
    }
}

/// A principal record that has not been persisted yet (no id assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrincipal {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub enabled: bool,
    pub account_non_locked: bool,
}

impl NewPrincipal {
    /// Assign storage-owned fields.
    pub fn into_principal(self, id: PrincipalId, created_at: DateTime<Utc>) -> Principal {
        Principal {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            enabled: self.enabled,
            account_non_locked: self.account_non_locked,
            failed_attempts: 0,
            created_at,
        }
    }
}

/// The resolved identity of an authenticated request.
///
/// Only identity and the single role authority; never the password hash or
/// lock/enable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub id: PrincipalId,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedPrincipal {
    pub fn authority(&self) -> &'static str {
        self.role.authority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        NewPrincipal {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
            role: Role::Doctor,
            enabled: true,
            account_non_locked: true,
        }
        .into_principal(PrincipalId::from_i64(7), Utc::now())
    }

    #[test]
    fn locks_when_threshold_is_reached() {
        let mut p = principal();
        for _ in 0..4 {
            assert!(!p.record_failed_attempt(5));
        }
        assert!(p.record_failed_attempt(5));
        assert!(p.is_locked());
        assert_eq!(p.failed_attempts, 5);
    }

    #[test]
    fn unlock_resets_counter() {
        let mut p = principal();
        p.record_failed_attempt(1);
        p.unlock();
        assert!(!p.is_locked());
        assert_eq!(p.failed_attempts, 0);
    }

    #[test]
    fn identity_projection_carries_role_authority() {
        let identity = principal().identity();
        assert_eq!(identity.id.as_i64(), 7);
        assert_eq!(identity.authority(), "ROLE_DOCTOR");
    }
}
