use gatekeeper_core::{DomainError, DomainResult};

use crate::Role;

const NAME_LEN: core::ops::RangeInclusive<usize> = 3..=16;
const PASSWORD_LEN: core::ops::RangeInclusive<usize> = 8..=16;
const EMAIL_MAX_LEN: usize = 254;

/// Self-service sign-up input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: Option<Role>,
}

impl Registration {
    /// The requested role, defaulting to `USER`.
    pub fn role(&self) -> Role {
        self.role.unwrap_or_default()
    }

    /// Field-level checks. Password confirmation is checked separately by
    /// the caller since it has its own error.
    pub fn validate(&self) -> DomainResult<()> {
        check_name("first_name", &self.first_name)?;
        check_name("last_name", &self.last_name)?;
        check_email(&self.email)?;

        validate_password(&self.password)?;

        if self.role() == Role::Admin {
            return Err(DomainError::validation("role ADMIN cannot be self-assigned"));
        }

        Ok(())
    }
}

/// Length policy shared by sign-up and password reset.
pub fn validate_password(password: &str) -> DomainResult<()> {
    let len = password.chars().count();
    if !PASSWORD_LEN.contains(&len) {
        return Err(DomainError::validation(format!(
            "password must be between {} and {} characters",
            PASSWORD_LEN.start(),
            PASSWORD_LEN.end()
        )));
    }
    Ok(())
}

pub fn passwords_match(password: &str, confirmation: &str) -> bool {
    password == confirmation
}

fn check_name(field: &str, value: &str) -> DomainResult<()> {
    let len = value.trim().chars().count();
    if !NAME_LEN.contains(&len) {
        return Err(DomainError::validation(format!(
            "{field} must be between {} and {} characters",
            NAME_LEN.start(),
            NAME_LEN.end()
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> DomainResult<()> {
    let invalid = || DomainError::validation(format!("'{email}' is not a valid email address"));

    if email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels_ok = domain.split('.').all(|label| !label.is_empty());
    if !domain.contains('.') || !labels_ok {
        return Err(invalid());
    }
    Ok(())
}
