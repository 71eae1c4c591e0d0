//! Runtime configuration read from environment variables.
//!
//! A missing variable falls back to a development default; a present but
//! unparsable one is an error.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use gatekeeper_auth::{PasswordHasher, TokenTtls};
use gatekeeper_infra::{AuthPolicy, DEFAULT_MAX_FAILED_ATTEMPTS, SweeperConfig};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Credentials of the administrator created at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub token_ttls: TokenTtls,
    pub hasher: PasswordHasher,
    pub policy: AuthPolicy,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub sweeper: SweeperConfig,
    pub admin: Option<AdminSeed>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("token_ttls", &self.token_ttls)
            .field("hasher", &self.hasher)
            .field("policy", &self.policy)
            .field("database", &self.database_url.as_ref().map(|_| "postgres"))
            .field("sweeper", &self.sweeper)
            .field("admin", &self.admin)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let defaults = TokenTtls::default();
        let token_ttls = TokenTtls::default()
            .with_access(secs_or(&var, "JWT_ACCESS_TTL_SECS", defaults.access)?)
            .with_refresh(secs_or(&var, "JWT_REFRESH_TTL_SECS", defaults.refresh)?)
            .with_activation(secs_or(&var, "JWT_ACTIVATION_TTL_SECS", defaults.activation)?)
            .with_password_reset(secs_or(&var, "JWT_RESET_TTL_SECS", defaults.password_reset)?);

        let hasher = match var("BCRYPT_COST") {
            None => PasswordHasher::default(),
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .and_then(|cost| PasswordHasher::with_cost(cost).ok())
                .ok_or(ConfigError::Invalid {
                    name: "BCRYPT_COST",
                    expected: "an integer in 4..=31",
                    value: raw,
                })?,
        };

        let max_failed_attempts = match var("MAX_FAILED_ATTEMPTS") {
            None => DEFAULT_MAX_FAILED_ATTEMPTS,
            Some(raw) => parse_positive("MAX_FAILED_ATTEMPTS", raw)? as u32,
        };
        let mut policy = AuthPolicy::default().with_max_failed_attempts(max_failed_attempts);
        if let Some(url) = var("PUBLIC_BASE_URL") {
            policy = policy.with_public_base_url(url);
        }

        let mut sweeper = SweeperConfig::default();
        if let Some(raw) = var("SWEEP_INTERVAL_SECS") {
            sweeper = sweeper.with_interval(Duration::from_secs(parse_positive("SWEEP_INTERVAL_SECS", raw)?));
        }
        if let Some(raw) = var("UNCONFIRMED_GRACE_SECS") {
            let secs = raw.parse::<i64>().ok().filter(|s| *s >= 0).ok_or(ConfigError::Invalid {
                name: "UNCONFIRMED_GRACE_SECS",
                expected: "a non-negative integer",
                value: raw,
            })?;
            sweeper = sweeper.with_unconfirmed_grace(chrono::Duration::seconds(secs));
        }

        let database_url = var("DATABASE_URL");
        if database_url.is_none() {
            warn!("DATABASE_URL not set; state is kept in memory and lost on restart");
        }

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("ADMIN_EMAIL and ADMIN_PASSWORD must both be set; skipping admin bootstrap");
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            token_ttls,
            hasher,
            policy,
            database_url,
            sweeper,
            admin,
        })
    }
}

fn secs_or(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: chrono::Duration,
) -> Result<chrono::Duration, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => {
            let secs = parse_positive(name, raw)?;
            Ok(chrono::Duration::seconds(secs as i64))
        }
    }
}

fn parse_positive(name: &'static str, raw: String) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0 && *v <= i64::MAX as u64)
        .ok_or(ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: raw,
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.token_ttls, TokenTtls::default());
        assert_eq!(cfg.policy, AuthPolicy::default());
        assert_eq!(cfg.sweeper.interval, Duration::from_secs(86_400));
        assert_eq!(cfg.sweeper.unconfirmed_grace, chrono::Duration::zero());
        assert!(cfg.database_url.is_none());
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("JWT_ACCESS_TTL_SECS", "60"),
            ("JWT_RESET_TTL_SECS", "120"),
            ("BCRYPT_COST", "4"),
            ("MAX_FAILED_ATTEMPTS", "3"),
            ("PUBLIC_BASE_URL", "https://auth.example.com"),
            ("SWEEP_INTERVAL_SECS", "30"),
            ("UNCONFIRMED_GRACE_SECS", "3600"),
            ("DATABASE_URL", "postgres://localhost/auth"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "rootroot"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.token_ttls.access, chrono::Duration::seconds(60));
        assert_eq!(cfg.token_ttls.password_reset, chrono::Duration::seconds(120));
        assert_eq!(cfg.token_ttls.refresh, TokenTtls::default().refresh);
        assert_eq!(cfg.hasher, PasswordHasher::with_cost(4).unwrap());
        assert_eq!(cfg.policy.max_failed_attempts, 3);
        assert_eq!(cfg.policy.public_base_url, "https://auth.example.com");
        assert_eq!(cfg.sweeper.interval, Duration::from_secs(30));
        assert_eq!(cfg.sweeper.unconfirmed_grace, chrono::Duration::hours(1));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/auth"));
        assert_eq!(cfg.admin.unwrap().email, "root@example.com");
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = config(&[("JWT_ACCESS_TTL_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_ACCESS_TTL_SECS", .. }));

        assert!(config(&[("BCRYPT_COST", "2")]).is_err());
        assert!(config(&[("MAX_FAILED_ATTEMPTS", "0")]).is_err());
        assert!(config(&[("UNCONFIRMED_GRACE_SECS", "-1")]).is_err());
    }

    #[test]
    fn half_configured_admin_is_ignored() {
        let cfg = config(&[("ADMIN_EMAIL", "root@example.com")]).unwrap();
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = config(&[
            ("JWT_SECRET", "s3cret"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "rootroot"),
        ])
        .unwrap();

        let printed = format!("{cfg:?}");
        assert!(!printed.contains("s3cret"));
        assert!(!printed.contains("rootroot"));
    }
}
