use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatekeeper_auth::{PrincipalId, Registration, Role};
use gatekeeper_core::DomainResult;
use gatekeeper_infra::TokenPair;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    /// `USER` or `DOCTOR`; defaults to `USER`.
    pub role: Option<String>,
}

impl RegisterRequest {
    pub fn into_registration(self) -> DomainResult<Registration> {
        let role = self.role.as_deref().map(str::parse::<Role>).transpose()?;
        Ok(Registration {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password: self.password,
            password_confirm: self.password_confirm,
            role,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub principal_id: PrincipalId,
    pub activation_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
        }
    }
}

/// A principal as exposed to administrators: never the password hash.
#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub id: PrincipalId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub enabled: bool,
    pub account_non_locked: bool,
    pub failed_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl From<gatekeeper_auth::Principal> for PrincipalResponse {
    fn from(p: gatekeeper_auth::Principal) -> Self {
        Self {
            id: p.id,
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            role: p.role,
            enabled: p.enabled,
            account_non_locked: p.account_non_locked,
            failed_attempts: p.failed_attempts,
            created_at: p.created_at,
        }
    }
}
