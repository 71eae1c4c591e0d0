//! In-memory store (dev/test).
//!
//! Both tables sit behind one `RwLock`, so every trait method is atomic and
//! multi-table operations never expose intermediate states.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gatekeeper_auth::{IssuedToken, NewPrincipal, Principal};
use gatekeeper_core::{PrincipalId, TokenId};

use super::{LockFilter, PrincipalStore, TokenStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    principals: BTreeMap<PrincipalId, Principal>,
    tokens: BTreeMap<TokenId, IssuedToken>,
    last_principal_id: i64,
    last_token_id: i64,
}

impl Tables {
    fn principal_by_email(&self, email: &str) -> Option<&Principal> {
        self.principals.values().find(|p| p.email == email)
    }

    fn insert_principal(&mut self, new: NewPrincipal) -> Result<Principal, StoreError> {
        if self.principal_by_email(&new.email).is_some() {
            return Err(StoreError::Conflict(format!("email '{}' already exists", new.email)));
        }
        self.last_principal_id += 1;
        let principal = new.into_principal(PrincipalId::from_i64(self.last_principal_id), Utc::now());
        self.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    fn insert_token(&mut self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError> {
        if !self.principals.contains_key(&principal_id) {
            return Err(StoreError::NotFound(format!("principal {principal_id}")));
        }
        if self.tokens.values().any(|t| t.token == token) {
            return Err(StoreError::Conflict("token already recorded".to_string()));
        }
        self.last_token_id += 1;
        let record = IssuedToken {
            id: TokenId::from_i64(self.last_token_id),
            token: token.to_string(),
            revoked: false,
            expired: false,
            principal_id,
        };
        self.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    fn principal_mut(&mut self, id: PrincipalId) -> Result<&mut Principal, StoreError> {
        self.principals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("principal {id}")))
    }

    fn revoke_valid_of(&mut self, principal_id: PrincipalId) -> u64 {
        let mut revoked = 0;
        for record in self
            .tokens
            .values_mut()
            .filter(|t| t.principal_id == principal_id && t.is_valid())
        {
            record.revoke();
            revoked += 1;
        }
        revoked
    }

    fn remove_principal(&mut self, id: PrincipalId) -> bool {
        self.tokens.retain(|_, t| t.principal_id != id);
        self.principals.remove(&id).is_some()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuthStore {
    tables: RwLock<Tables>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl PrincipalStore for InMemoryAuthStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.read()?.principal_by_email(email).cloned())
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.read()?.principals.get(&id).cloned())
    }

    async fn insert(&self, principal: NewPrincipal) -> Result<Principal, StoreError> {
        self.write()?.insert_principal(principal)
    }

    async fn register(
        &self,
        principal: NewPrincipal,
        activation_token: &str,
    ) -> Result<Principal, StoreError> {
        let mut tables = self.write()?;
        let created = tables.insert_principal(principal)?;
        if let Err(e) = tables.insert_token(created.id, activation_token) {
            tables.remove_principal(created.id);
            tables.last_principal_id -= 1;
            return Err(e);
        }
        Ok(created)
    }

    async fn record_failed_attempt(
        &self,
        id: PrincipalId,
        threshold: u32,
    ) -> Result<Principal, StoreError> {
        let mut tables = self.write()?;
        let principal = tables.principal_mut(id)?;
        principal.record_failed_attempt(threshold);
        Ok(principal.clone())
    }

    async fn reset_failed_attempts(&self, id: PrincipalId) -> Result<(), StoreError> {
        self.write()?.principal_mut(id)?.failed_attempts = 0;
        Ok(())
    }

    async fn set_enabled(&self, id: PrincipalId, enabled: bool) -> Result<Principal, StoreError> {
        let mut tables = self.write()?;
        let principal = tables.principal_mut(id)?;
        principal.enabled = enabled;
        Ok(principal.clone())
    }

    async fn lock_and_revoke_tokens(&self, id: PrincipalId) -> Result<(Principal, u64), StoreError> {
        let mut tables = self.write()?;
        let principal = tables.principal_mut(id)?;
        principal.lock();
        let locked = principal.clone();
        Ok((locked, tables.revoke_valid_of(id)))
    }

    async fn unlock(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        let mut tables = self.write()?;
        let principal = tables.principal_mut(id)?;
        principal.unlock();
        Ok(principal.clone())
    }

    async fn reset_password(
        &self,
        id: PrincipalId,
        password_hash: &str,
        reset_token: &str,
    ) -> Result<Option<u64>, StoreError> {
        let mut tables = self.write()?;
        let usable = tables
            .tokens
            .values()
            .any(|t| t.token == reset_token && t.principal_id == id && t.is_valid());
        if !usable {
            return Ok(None);
        }
        tables.principal_mut(id)?.password_hash = password_hash.to_string();
        Ok(Some(tables.revoke_valid_of(id)))
    }

    async fn list(&self, filter: LockFilter) -> Result<Vec<Principal>, StoreError> {
        Ok(self
            .read()?
            .principals
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: PrincipalId) -> Result<bool, StoreError> {
        Ok(self.write()?.remove_principal(id))
    }

    async fn delete_unconfirmed(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let doomed: Vec<PrincipalId> = tables
            .principals
            .values()
            .filter(|p| !p.enabled && p.created_at <= created_before)
            .map(|p| p.id)
            .collect();
        for id in &doomed {
            tables.remove_principal(*id);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl TokenStore for InMemoryAuthStore {
    async fn save(&self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError> {
        self.write()?.insert_token(principal_id, token)
    }

    async fn find_token(&self, token: &str) -> Result<Option<IssuedToken>, StoreError> {
        Ok(self.read()?.tokens.values().find(|t| t.token == token).cloned())
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if let Some(record) = tables.tokens.values_mut().find(|t| t.token == token) {
            record.revoke();
        }
        Ok(())
    }

    async fn revoke_all_valid(&self, principal_id: PrincipalId) -> Result<u64, StoreError> {
        Ok(self.write()?.revoke_valid_of(principal_id))
    }

    async fn rotate(&self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError> {
        let mut tables = self.write()?;
        if !tables.principals.contains_key(&principal_id) {
            return Err(StoreError::NotFound(format!("principal {principal_id}")));
        }
        tables.revoke_valid_of(principal_id);
        tables.insert_token(principal_id, token)
    }

    async fn purge_revoked_or_expired(&self) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, t| t.is_valid());
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn tokens_for(&self, principal_id: PrincipalId) -> Result<Vec<IssuedToken>, StoreError> {
        Ok(self
            .read()?
            .tokens
            .values()
            .filter(|t| t.principal_id == principal_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_auth::Role;

    fn new_principal(email: &str, enabled: bool) -> NewPrincipal {
        NewPrincipal {
            first_name: "Test".into(),
            last_name: "User".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            enabled,
            account_non_locked: true,
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_rejects_duplicate_email() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        let b = store.insert(new_principal("b@x.com", true)).await.unwrap();
        assert!(b.id > a.id);

        let err = store.insert(new_principal("a@x.com", true)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let store = InMemoryAuthStore::new();
        store.insert(new_principal("a@x.com", true)).await.unwrap();
        assert!(store.find_by_email("A@x.com").await.unwrap().is_none());
        assert!(store.exists_by_email("a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn register_is_all_or_nothing() {
        let store = InMemoryAuthStore::new();
        let a = store.register(new_principal("a@x.com", false), "tok-1").await.unwrap();
        assert_eq!(store.tokens_for(a.id).await.unwrap().len(), 1);

        // Token collision rolls back the principal insert.
        let err = store
            .register(new_principal("b@x.com", false), "tok-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());

        let b = store.register(new_principal("b@x.com", false), "tok-2").await.unwrap();
        assert_eq!(b.id.as_i64(), a.id.as_i64() + 1);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid_and_revoke_is_a_no_op() {
        let store = InMemoryAuthStore::new();
        assert!(!store.is_valid("nope").await.unwrap());
        store.revoke("nope").await.unwrap();
    }

    #[tokio::test]
    async fn revoke_all_valid_only_touches_the_owner() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        let b = store.insert(new_principal("b@x.com", true)).await.unwrap();
        store.save(a.id, "a1").await.unwrap();
        store.save(a.id, "a2").await.unwrap();
        store.save(b.id, "b1").await.unwrap();

        assert_eq!(store.revoke_all_valid(a.id).await.unwrap(), 2);
        assert_eq!(store.revoke_all_valid(a.id).await.unwrap(), 0);
        assert!(!store.is_valid("a1").await.unwrap());
        assert!(store.is_valid("b1").await.unwrap());

        let a1 = store.find_token("a1").await.unwrap().unwrap();
        assert!(a1.revoked && a1.expired);
    }

    #[tokio::test]
    async fn rotate_leaves_exactly_one_valid_token() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        store.save(a.id, "old").await.unwrap();
        store.rotate(a.id, "new").await.unwrap();

        let valid: Vec<_> = store
            .tokens_for(a.id)
            .await
            .unwrap()
            .into_iter()
            .filter(IssuedToken::is_valid)
            .collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].token, "new");
    }

    #[tokio::test]
    async fn purge_removes_only_invalid_rows() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        store.save(a.id, "keep").await.unwrap();
        store.save(a.id, "drop").await.unwrap();
        store.revoke("drop").await.unwrap();

        assert_eq!(store.purge_revoked_or_expired().await.unwrap(), 1);
        let remaining = store.tokens_for(a.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, "keep");
        assert!(store.find_token("drop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_unconfirmed_respects_cutoff_and_cascades() {
        let store = InMemoryAuthStore::new();
        let pending = store.register(new_principal("p@x.com", false), "act").await.unwrap();
        let active = store.insert(new_principal("a@x.com", true)).await.unwrap();

        let long_ago = pending.created_at - chrono::Duration::hours(1);
        assert_eq!(store.delete_unconfirmed(long_ago).await.unwrap(), 0);

        assert_eq!(store.delete_unconfirmed(Utc::now()).await.unwrap(), 1);
        assert!(store.find_by_id(pending.id).await.unwrap().is_none());
        assert!(store.find_token("act").await.unwrap().is_none());
        assert!(store.find_by_id(active.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_password_consumes_the_token_once() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        store.save(a.id, "session").await.unwrap();
        store.save(a.id, "reset").await.unwrap();

        assert_eq!(store.reset_password(a.id, "new-hash", "reset").await.unwrap(), Some(2));
        assert_eq!(
            store.find_by_id(a.id).await.unwrap().unwrap().password_hash,
            "new-hash"
        );
        assert!(!store.is_valid("session").await.unwrap());
        assert!(!store.is_valid("reset").await.unwrap());

        assert_eq!(store.reset_password(a.id, "other-hash", "reset").await.unwrap(), None);
        assert_eq!(
            store.find_by_id(a.id).await.unwrap().unwrap().password_hash,
            "new-hash"
        );
    }

    #[tokio::test]
    async fn reset_password_ignores_tokens_of_other_principals() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        let b = store.insert(new_principal("b@x.com", true)).await.unwrap();
        store.save(b.id, "b-reset").await.unwrap();

        assert_eq!(store.reset_password(a.id, "new-hash", "b-reset").await.unwrap(), None);
        assert!(store.is_valid("b-reset").await.unwrap());
        assert_eq!(store.find_by_id(a.id).await.unwrap().unwrap().password_hash, "hash");
    }

    #[tokio::test]
    async fn narrow_updates_leave_other_columns_alone() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", false)).await.unwrap();
        store.save(a.id, "reset").await.unwrap();

        let after = store.record_failed_attempt(a.id, 2).await.unwrap();
        assert_eq!(after.failed_attempts, 1);
        assert!(!after.is_locked());

        store.reset_password(a.id, "new-hash", "reset").await.unwrap();
        let after = store.record_failed_attempt(a.id, 2).await.unwrap();
        assert!(after.is_locked());
        assert_eq!(after.password_hash, "new-hash");

        let enabled = store.set_enabled(a.id, true).await.unwrap();
        assert!(enabled.enabled && enabled.is_locked());

        store.reset_failed_attempts(a.id).await.unwrap();
        let reloaded = store.find_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.failed_attempts, 0);
        assert!(reloaded.is_locked());
        assert_eq!(reloaded.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn lock_revokes_tokens_and_unlock_clears_counter() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        store.save(a.id, "t").await.unwrap();
        store.record_failed_attempt(a.id, 5).await.unwrap();

        let (locked, revoked) = store.lock_and_revoke_tokens(a.id).await.unwrap();
        assert!(locked.is_locked());
        assert_eq!(revoked, 1);
        assert!(!store.is_valid("t").await.unwrap());

        let unlocked = store.unlock(a.id).await.unwrap();
        assert!(!unlocked.is_locked());
        assert_eq!(unlocked.failed_attempts, 0);

        let missing = PrincipalId::from_i64(999);
        assert!(matches!(store.unlock(missing).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.record_failed_attempt(missing, 5).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_by_lock_state() {
        let store = InMemoryAuthStore::new();
        let a = store.insert(new_principal("a@x.com", true)).await.unwrap();
        store.insert(new_principal("b@x.com", true)).await.unwrap();
        store.lock_and_revoke_tokens(a.id).await.unwrap();

        assert_eq!(store.list(LockFilter::All).await.unwrap().len(), 2);
        let locked = store.list(LockFilter::Locked).await.unwrap();
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].email, "a@x.com");
        assert_eq!(store.list(LockFilter::Unlocked).await.unwrap().len(), 1);
    }
}
