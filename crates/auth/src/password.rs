//! Password hashing (bcrypt).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid bcrypt cost {0} (expected 4..=31)")]
    InvalidCost(u32),

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

/// Salted bcrypt hashing with a configurable cost.
///
/// `verify` delegates to bcrypt, which compares digests in constant time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    pub fn with_cost(cost: u32) -> Result<Self, PasswordError> {
        if !(4..=31).contains(&cost) {
            return Err(PasswordError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(password, hash)?)
    }
}
