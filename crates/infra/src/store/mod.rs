//! Persistence of principals and issued-token records.
//!
//! Two traits, one per table, plus [`AuthStore`] for backends that hold both.
//! Operations that touch both tables (register, rotate, lock, password reset,
//! delete) are single trait methods so each backend can make them atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gatekeeper_auth::{IssuedToken, NewPrincipal, Principal};
use gatekeeper_core::PrincipalId;

use crate::error::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAuthStore;
pub use postgres::PostgresAuthStore;

/// Which principals a listing returns.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LockFilter {
    #[default]
    All,
    Locked,
    Unlocked,
}

impl LockFilter {
    pub fn matches(&self, principal: &Principal) -> bool {
        match self {
            LockFilter::All => true,
            LockFilter::Locked => !principal.account_non_locked,
            LockFilter::Unlocked => principal.account_non_locked,
        }
    }
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Case-sensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    /// Fails with `Conflict` if the email is taken.
    async fn insert(&self, principal: NewPrincipal) -> Result<Principal, StoreError>;

    /// Insert the principal and its activation token record in one unit.
    async fn register(
        &self,
        principal: NewPrincipal,
        activation_token: &str,
    ) -> Result<Principal, StoreError>;

    // Mutations below touch only the columns they name, so concurrent writers
    // of other columns are never overwritten with a stale snapshot. Each fails
    // with `NotFound` if the id is unknown.

    /// Increment the failure counter and lock once it reaches `threshold`.
    ///
    /// Returns the row as stored after the increment.
    async fn record_failed_attempt(
        &self,
        id: PrincipalId,
        threshold: u32,
    ) -> Result<Principal, StoreError>;

    async fn reset_failed_attempts(&self, id: PrincipalId) -> Result<(), StoreError>;

    async fn set_enabled(&self, id: PrincipalId, enabled: bool) -> Result<Principal, StoreError>;

    /// Lock the account and revoke every valid token of the principal, in one unit.
    ///
    /// Returns the stored row and the number of revoked tokens.
    async fn lock_and_revoke_tokens(&self, id: PrincipalId) -> Result<(Principal, u64), StoreError>;

    /// Unlock the account and clear the failure counter.
    async fn unlock(&self, id: PrincipalId) -> Result<Principal, StoreError>;

    /// Consume `reset_token`, store the new hash and revoke every other valid
    /// token of the principal, in one unit.
    ///
    /// `None` if the token is not a valid record of this principal; nothing is
    /// written then. Otherwise the number of revoked tokens, the reset token
    /// included. Of two concurrent calls with the same token at most one
    /// returns `Some`.
    async fn reset_password(
        &self,
        id: PrincipalId,
        password_hash: &str,
        reset_token: &str,
    ) -> Result<Option<u64>, StoreError>;

    /// Ordered by id.
    async fn list(&self, filter: LockFilter) -> Result<Vec<Principal>, StoreError>;

    /// Delete the principal together with its tokens. `false` if it did not exist.
    async fn delete(&self, id: PrincipalId) -> Result<bool, StoreError>;

    /// Delete every principal with `enabled=false` created at or before
    /// `created_before`, together with its tokens.
    async fn delete_unconfirmed(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new record with `revoked=false, expired=false`.
    ///
    /// Other valid records of the principal are left alone. Password reset
    /// tokens rely on this: the reset token coexists with the current access
    /// token until `reset_password` consumes it and revokes both.
    async fn save(&self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError>;

    async fn find_token(&self, token: &str) -> Result<Option<IssuedToken>, StoreError>;

    /// Fail-closed: an unknown token is not valid.
    async fn is_valid(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self
            .find_token(token)
            .await?
            .is_some_and(|record| record.is_valid()))
    }

    /// Idempotent; unknown tokens are a no-op.
    async fn revoke(&self, token: &str) -> Result<(), StoreError>;

    /// Mark every valid token of the principal revoked and expired.
    async fn revoke_all_valid(&self, principal_id: PrincipalId) -> Result<u64, StoreError>;

    /// `revoke_all_valid` then `save`, in one unit, serialized per principal.
    async fn rotate(&self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError>;

    /// Delete every record that is revoked or expired.
    async fn purge_revoked_or_expired(&self) -> Result<u64, StoreError>;

    /// Ordered by id.
    async fn tokens_for(&self, principal_id: PrincipalId) -> Result<Vec<IssuedToken>, StoreError>;
}

/// A backend holding both tables.
pub trait AuthStore: PrincipalStore + TokenStore {}

impl<T: PrincipalStore + TokenStore + ?Sized> AuthStore for T {}
