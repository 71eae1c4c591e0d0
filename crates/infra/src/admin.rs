//! Account administration (ROLE_ADMIN operations).

use std::sync::Arc;

use tracing::{info, instrument};

use gatekeeper_auth::{AuthenticatedPrincipal, Principal, Role, authorize_role};

use crate::error::AuthError;
use crate::store::{AuthStore, LockFilter, PrincipalStore};

pub struct AccountAdmin {
    store: Arc<dyn AuthStore>,
}

impl AccountAdmin {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id), err(level = "debug"))]
    pub async fn list(
        &self,
        actor: &AuthenticatedPrincipal,
        filter: LockFilter,
    ) -> Result<Vec<Principal>, AuthError> {
        authorize_role(actor, Role::Admin)?;
        Ok(self.store.list(filter).await?)
    }

    /// Delete a principal and all of its token records.
    #[instrument(skip(self, actor), fields(actor = %actor.id), err(level = "debug"))]
    pub async fn delete(&self, actor: &AuthenticatedPrincipal, email: &str) -> Result<(), AuthError> {
        let target = self.target(actor, email).await?;
        self.store.delete(target.id).await?;
        info!(principal_id = %target.id, "principal deleted by admin");
        Ok(())
    }

    /// Lock the account and end its session.
    #[instrument(skip(self, actor), fields(actor = %actor.id), err(level = "debug"))]
    pub async fn lock(&self, actor: &AuthenticatedPrincipal, email: &str) -> Result<Principal, AuthError> {
        let target = self.target(actor, email).await?;
        let (locked, revoked) = self
            .store
            .lock_and_revoke_tokens(target.id)
            .await
            .map_err(AuthError::from_principal_write)?;
        info!(principal_id = %locked.id, revoked, "principal locked by admin");
        Ok(locked)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id), err(level = "debug"))]
    pub async fn unlock(&self, actor: &AuthenticatedPrincipal, email: &str) -> Result<Principal, AuthError> {
        authorize_role(actor, Role::Admin)?;
        let target = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;
        let unlocked = self
            .store
            .unlock(target.id)
            .await
            .map_err(AuthError::from_principal_write)?;
        info!(principal_id = %unlocked.id, "principal unlocked by admin");
        Ok(unlocked)
    }

    /// Resolve the target of a destructive operation; admins cannot target themselves.
    async fn target(&self, actor: &AuthenticatedPrincipal, email: &str) -> Result<Principal, AuthError> {
        authorize_role(actor, Role::Admin)?;
        if actor.email == email {
            return Err(AuthError::Forbidden(
                "administrators cannot lock or delete their own account".to_string(),
            ));
        }
        self.store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::PrincipalNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_auth::NewPrincipal;

    use crate::store::{InMemoryAuthStore, TokenStore};

    fn new_principal(email: &str, role: Role) -> NewPrincipal {
        NewPrincipal {
            first_name: "Test".into(),
            last_name: "User".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role,
            enabled: true,
            account_non_locked: true,
        }
    }

    async fn setup() -> (Arc<InMemoryAuthStore>, AccountAdmin, AuthenticatedPrincipal, Principal) {
        let store = Arc::new(InMemoryAuthStore::new());
        let admin = store.insert(new_principal("root@x.com", Role::Admin)).await.unwrap();
        let user = store.insert(new_principal("u@x.com", Role::User)).await.unwrap();
        (store.clone(), AccountAdmin::new(store), admin.identity(), user)
    }

    #[tokio::test]
    async fn non_admins_are_forbidden() {
        let (_, admin, _, user) = setup().await;
        let err = admin.list(&user.identity(), LockFilter::All).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));
    }

    #[tokio::test]
    async fn lock_revokes_session_and_unlock_resets_counter() {
        let (store, admin, actor, user) = setup().await;
        store.save(user.id, "session").await.unwrap();

        let locked = admin.lock(&actor, "u@x.com").await.unwrap();
        assert!(locked.is_locked());
        assert!(!store.is_valid("session").await.unwrap());
        assert_eq!(admin.list(&actor, LockFilter::Locked).await.unwrap().len(), 1);

        let unlocked = admin.unlock(&actor, "u@x.com").await.unwrap();
        assert!(!unlocked.is_locked());
        assert_eq!(unlocked.failed_attempts, 0);
    }

    #[tokio::test]
    async fn lock_and_unlock_leave_the_password_hash_alone() {
        let (store, admin, actor, user) = setup().await;
        store.save(user.id, "reset").await.unwrap();
        store.record_failed_attempt(user.id, 5).await.unwrap();

        // A reset committed after the admin loaded the account list.
        store.reset_password(user.id, "reset-hash", "reset").await.unwrap();

        let locked = admin.lock(&actor, "u@x.com").await.unwrap();
        assert_eq!(locked.password_hash, "reset-hash");
        assert_eq!(locked.failed_attempts, 1);

        admin.unlock(&actor, "u@x.com").await.unwrap();
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "reset-hash");
        assert!(!stored.is_locked());
    }

    #[tokio::test]
    async fn delete_removes_principal_and_tokens() {
        let (store, admin, actor, user) = setup().await;
        store.save(user.id, "session").await.unwrap();

        admin.delete(&actor, "u@x.com").await.unwrap();
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
        assert!(store.find_token("session").await.unwrap().is_none());

        assert!(matches!(
            admin.delete(&actor, "u@x.com").await.unwrap_err(),
            AuthError::PrincipalNotFound
        ));
    }

    #[tokio::test]
    async fn admin_cannot_target_self() {
        let (_, admin, actor, _) = setup().await;
        assert!(matches!(
            admin.delete(&actor, "root@x.com").await.unwrap_err(),
            AuthError::Forbidden(_)
        ));
        assert!(matches!(
            admin.lock(&actor, "root@x.com").await.unwrap_err(),
            AuthError::Forbidden(_)
        ));
    }
}
