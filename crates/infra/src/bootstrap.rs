use tracing::info;

use gatekeeper_auth::{NewPrincipal, PasswordHasher, Principal, Role};

use crate::credentials::hash_password;
use crate::error::{AuthError, StoreError};
use crate::store::PrincipalStore;

/// Create the bootstrap administrator unless a principal with `email` exists.
///
/// Returns the created principal, or `None` when nothing had to be done.
pub async fn ensure_admin<S: PrincipalStore + ?Sized>(
    store: &S,
    hasher: PasswordHasher,
    email: &str,
    password: &str,
) -> Result<Option<Principal>, AuthError> {
    if store.exists_by_email(email).await? {
        return Ok(None);
    }

    let admin = NewPrincipal {
        first_name: "Admin".to_string(),
        last_name: "Admin".to_string(),
        email: email.to_string(),
        password_hash: hash_password(hasher, password).await?,
        role: Role::Admin,
        enabled: true,
        account_non_locked: true,
    };

    match store.insert(admin).await {
        Ok(created) => {
            info!(principal_id = %created.id, "bootstrap administrator created");
            Ok(Some(created))
        }
        // Another instance seeded it first.
        Err(StoreError::Conflict(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAuthStore;

    #[tokio::test]
    async fn seeds_once() {
        let store = InMemoryAuthStore::new();
        let hasher = PasswordHasher::with_cost(4).unwrap();

        let created = ensure_admin(&store, hasher, "root@x.com", "rootpass1").await.unwrap();
        let created = created.unwrap();
        assert_eq!(created.role, Role::Admin);
        assert!(created.enabled && created.account_non_locked);
        assert!(hasher.verify("rootpass1", &created.password_hash).unwrap());

        assert!(ensure_admin(&store, hasher, "root@x.com", "other").await.unwrap().is_none());
    }
}
