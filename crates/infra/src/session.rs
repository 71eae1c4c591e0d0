//! Authentication lifecycle: registration, login, refresh, logout, account
//! activation and password reset.
//!
//! Each operation that writes more than one record does so through a single
//! store call, so a failure leaves nothing half-applied. Token rotation
//! revokes before it saves: a crash in between leaves the principal with no
//! valid token rather than two.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use gatekeeper_auth::{
    NewPrincipal, PasswordHasher, Principal, Registration, TokenCodec, TokenError, TokenKind,
    bearer_token, passwords_match, validate_password,
};

use crate::credentials::{CredentialValidator, DEFAULT_MAX_FAILED_ATTEMPTS, hash_password};
use crate::error::{AuthError, StoreError};
use crate::notifier::{Links, Notification, NotificationKind, Notifier};
use crate::store::{AuthStore, PrincipalStore, TokenStore};

/// Tunables of the session service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    pub max_failed_attempts: u32,
    /// Prefix of the links sent in notifications.
    pub public_base_url: String,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl AuthPolicy {
    pub fn with_max_failed_attempts(mut self, max: u32) -> Self {
        self.max_failed_attempts = max;
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredAccount {
    pub principal: Principal,
    pub activation_token: String,
}

pub struct AuthSessionService {
    store: Arc<dyn AuthStore>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    credentials: CredentialValidator<dyn AuthStore>,
    notifier: Arc<dyn Notifier>,
    links: Links,
}

impl AuthSessionService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        codec: TokenCodec,
        hasher: PasswordHasher,
        notifier: Arc<dyn Notifier>,
        policy: AuthPolicy,
    ) -> Self {
        let credentials = CredentialValidator::new(store.clone(), hasher, policy.max_failed_attempts);
        Self {
            store,
            codec,
            hasher,
            credentials,
            notifier,
            links: Links::new(policy.public_base_url),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    /// Create a disabled principal plus its activation token, then send the
    /// activation link.
    #[instrument(skip(self, registration), fields(email = %registration.email), err(level = "debug"))]
    pub async fn register(&self, registration: Registration) -> Result<RegisteredAccount, AuthError> {
        if !passwords_match(&registration.password, &registration.password_confirm) {
            return Err(AuthError::PasswordMismatch);
        }
        registration.validate()?;

        if self.store.exists_by_email(&registration.email).await? {
            return Err(AuthError::EmailExists);
        }

        let password_hash = hash_password(self.hasher, &registration.password).await?;
        let activation_token = self.codec.mint_activation(&registration.email, Utc::now())?;

        let new = NewPrincipal {
            first_name: registration.first_name.trim().to_string(),
            last_name: registration.last_name.trim().to_string(),
            role: registration.role(),
            email: registration.email,
            password_hash,
            enabled: false,
            account_non_locked: true,
        };

        // A concurrent registration can still win the race for the email.
        let principal = self
            .store
            .register(new, &activation_token)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::EmailExists,
                other => AuthError::Store(other),
            })?;

        info!(principal_id = %principal.id, role = %principal.role, "principal registered");

        self.notify(Notification {
            kind: NotificationKind::AccountActivation,
            recipient: principal.email.clone(),
            recipient_name: principal.first_name.clone(),
            link: self.links.activation(&activation_token),
            expires_in: self.codec.ttls().activation,
        })
        .await;

        Ok(RegisteredAccount {
            principal,
            activation_token,
        })
    }

    /// Validate credentials and start a new single active session.
    #[instrument(skip(self, password), err(level = "debug"))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let principal = self.credentials.validate(email, password).await?;

        let now = Utc::now();
        let access_token = self.codec.mint_access(&principal, now)?;
        let refresh_token = self.codec.mint_refresh(&principal.email, now)?;

        self.store.rotate(principal.id, &access_token).await?;
        info!(principal_id = %principal.id, "principal authenticated");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Mint a new access token from the refresh token in an `Authorization`
    /// header value. The refresh token itself is returned unchanged.
    #[instrument(skip_all, err(level = "debug"))]
    pub async fn refresh(&self, authorization: Option<&str>) -> Result<TokenPair, AuthError> {
        let refresh_token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::Unauthorized)?;

        let now = Utc::now();
        let parsed = self
            .codec
            .parse_kind(refresh_token, TokenKind::Refresh, now)
            .map_err(|e| {
                debug!(reason = e.reason(), "refresh token rejected");
                AuthError::Unauthorized
            })?;

        let Some(principal) = self.store.find_by_email(&parsed.subject).await? else {
            debug!("refresh token subject has no principal");
            return Err(AuthError::Unauthorized);
        };
        if !parsed.is_valid_for(&principal.email, now) || principal.is_locked() || !principal.enabled {
            debug!(principal_id = %principal.id, "refresh refused for principal state");
            return Err(AuthError::Unauthorized);
        }

        let access_token = self.codec.mint_access(&principal, now)?;
        self.store.rotate(principal.id, &access_token).await?;
        info!(principal_id = %principal.id, "access token refreshed");

        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.to_string(),
        })
    }

    /// Revoke one access token. The matching refresh token stays usable until
    /// it expires.
    #[instrument(skip_all, err(level = "debug"))]
    pub async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        self.store.revoke(access_token).await?;
        info!("access token revoked");
        Ok(())
    }

    #[instrument(skip_all, err(level = "debug"))]
    pub async fn enable_account(&self, activation_token: &str) -> Result<Principal, AuthError> {
        let parsed = self
            .codec
            .parse_kind(activation_token, TokenKind::Activation, Utc::now())?;

        let principal = self
            .store
            .find_by_email(&parsed.subject)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        if principal.enabled {
            return Ok(principal);
        }
        let principal = self
            .store
            .set_enabled(principal.id, true)
            .await
            .map_err(AuthError::from_principal_write)?;
        info!(principal_id = %principal.id, "principal enabled");
        Ok(principal)
    }

    /// Persist a reset token and send the reset link. Returns the token.
    ///
    /// The current access token stays valid next to the reset token; both are
    /// revoked when the reset token is used.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn request_password_reset(&self, email: &str) -> Result<String, AuthError> {
        let principal = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        let token = self.codec.mint_password_reset(&principal.email, Utc::now())?;
        self.store.save(principal.id, &token).await?;
        info!(principal_id = %principal.id, "password reset requested");

        self.notify(Notification {
            kind: NotificationKind::PasswordReset,
            recipient: principal.email.clone(),
            recipient_name: principal.first_name.clone(),
            link: self.links.password_reset(&token),
            expires_in: self.codec.ttls().password_reset,
        })
        .await;

        Ok(token)
    }

    /// Set a new password with a single-use reset token. Revokes every valid
    /// token of the principal, the reset token included.
    ///
    /// The token is consumed in the same store call that writes the hash, so
    /// of two concurrent calls with one token exactly one succeeds.
    #[instrument(skip_all, err(level = "debug"))]
    pub async fn update_password(
        &self,
        reset_token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<(), AuthError> {
        if !passwords_match(password, password_confirm) {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(password)?;

        let parsed = self
            .codec
            .parse_kind(reset_token, TokenKind::PasswordReset, Utc::now())?;
        if !self.store.is_valid(reset_token).await? {
            debug!("reset token already used or unknown");
            return Err(AuthError::Token(TokenError::Expired));
        }

        let principal = self
            .store
            .find_by_email(&parsed.subject)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        let password_hash = hash_password(self.hasher, password).await?;
        let Some(revoked) = self
            .store
            .reset_password(principal.id, &password_hash, reset_token)
            .await
            .map_err(AuthError::from_principal_write)?
        else {
            debug!(principal_id = %principal.id, "reset token consumed concurrently");
            return Err(AuthError::Token(TokenError::Expired));
        };
        info!(principal_id = %principal.id, revoked, "password updated");

        Ok(())
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(
                recipient = %notification.recipient,
                kind = ?notification.kind,
                error = %e,
                "notification failed; continuing"
            );
        }
    }
}
