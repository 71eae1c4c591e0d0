//! Email/password verification with failed-attempt lockout.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use gatekeeper_auth::{PasswordHasher, Principal};

use crate::error::AuthError;
use crate::store::PrincipalStore;

/// Lockout threshold when none is configured.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

const DUMMY_PASSWORD: &str = "no-such-principal";

pub struct CredentialValidator<S: ?Sized> {
    store: Arc<S>,
    hasher: PasswordHasher,
    max_failed_attempts: u32,
    /// Verified against on an unknown email so the miss costs one bcrypt
    /// run like a hit does.
    dummy_hash: Option<String>,
}

impl<S: PrincipalStore + ?Sized> CredentialValidator<S> {
    pub fn new(store: Arc<S>, hasher: PasswordHasher, max_failed_attempts: u32) -> Self {
        let dummy_hash = match hasher.hash(DUMMY_PASSWORD) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(error = %e, "failed to prepare dummy password hash");
                None
            }
        };
        Self {
            store,
            hasher,
            max_failed_attempts: max_failed_attempts.max(1),
            dummy_hash,
        }
    }

    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    /// Verify `password` for the principal registered under `email`.
    ///
    /// Every failure is persisted before returning, so the counter survives
    /// restarts. A locked account is refused before the password is checked.
    /// Counter changes are applied by the store in place; the looked-up row is
    /// never written back.
    #[instrument(skip(self, password), err(level = "debug"))]
    pub async fn validate(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let Some(mut principal) = self.store.find_by_email(email).await? else {
            debug!("no principal for email");
            if let Some(dummy) = &self.dummy_hash {
                verify_password(self.hasher, password, dummy).await?;
            }
            return Err(AuthError::InvalidCredentials);
        };

        if principal.is_locked() {
            return Err(AuthError::AccountLocked);
        }

        if !verify_password(self.hasher, password, &principal.password_hash).await? {
            let after = self
                .store
                .record_failed_attempt(principal.id, self.max_failed_attempts)
                .await?;

            if after.is_locked() {
                warn!(
                    principal_id = %after.id,
                    failed_attempts = after.failed_attempts,
                    "account locked after repeated failed logins"
                );
                return Err(AuthError::AccountLocked);
            }
            return Err(AuthError::InvalidCredentials);
        }

        if !principal.enabled {
            return Err(AuthError::AccountDisabled);
        }

        if principal.failed_attempts != 0 {
            self.store.reset_failed_attempts(principal.id).await?;
            principal.failed_attempts = 0;
        }

        Ok(principal)
    }
}

/// bcrypt is CPU-bound; keep it off the async workers.
pub(crate) async fn verify_password(
    hasher: PasswordHasher,
    password: &str,
    hash: &str,
) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("password verification task failed: {e}")))?
        .map_err(AuthError::from)
}

pub(crate) async fn hash_password(hasher: PasswordHasher, password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(AuthError::from)
}
