//! Error taxonomy of the persistence and orchestration layer.

use thiserror::Error;

use gatekeeper_auth::{AuthzError, PasswordError, TokenError};
use gatekeeper_core::DomainError;

/// Failure of the backing persistence call.
///
/// Lookup misses are not errors: stores return `Option`/`bool` for those.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint violated (duplicate email or token).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A record that must exist for a mutation was not found.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Typed failures of credential validation and session operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("an account with this email already exists")]
    EmailExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked,

    #[error("account is not activated")]
    AccountDisabled,

    #[error("principal not found")]
    PrincipalNotFound,

    /// Token decode failure on an operation that takes a token as input.
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// For writes keyed by a principal id looked up just before: `NotFound`
    /// means the principal was deleted in between.
    pub(crate) fn from_principal_write(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AuthError::PrincipalNotFound,
            other => AuthError::Store(other),
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        AuthError::Validation(err.detail().to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<AuthzError> for AuthError {
    fn from(err: AuthzError) -> Self {
        AuthError::Forbidden(err.to_string())
    }
}
