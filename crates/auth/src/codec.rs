//! Signed, expiring tokens (HS256).
//!
//! The codec is a pure function of the shared secret and the `now` passed by
//! the caller: it never reads the system clock itself, so expiry behaviour
//! is deterministic under test.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::claims::{RESERVED_CLAIMS, TokenClaims, TokenKind, validate_window};
use crate::Principal;

/// Time-to-live per token class; each is configured independently.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
    pub activation: Duration,
    pub password_reset: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: Duration::hours(24),
            refresh: Duration::days(7),
            activation: Duration::minutes(15),
            password_reset: Duration::minutes(15),
        }
    }
}

impl TokenTtls {
    pub fn for_kind(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access,
            TokenKind::Refresh => self.refresh,
            TokenKind::Activation => self.activation,
            TokenKind::PasswordReset => self.password_reset,
        }
    }

    pub fn with_access(mut self, ttl: Duration) -> Self {
        self.access = ttl;
        self
    }

    pub fn with_refresh(mut self, ttl: Duration) -> Self {
        self.refresh = ttl;
        self
    }

    pub fn with_activation(mut self, ttl: Duration) -> Self {
        self.activation = ttl;
        self
    }

    pub fn with_password_reset(mut self, ttl: Duration) -> Self {
        self.password_reset = ttl;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token format is not supported")]
    Unsupported,

    #[error("expected a {expected} token, got {found}")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("claim '{0}' is reserved")]
    ReservedClaim(String),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short sub-reason used in server-side logs.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Expired => "expired",
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "signature",
            TokenError::Unsupported => "unsupported",
            TokenError::WrongKind { .. } => "wrong_kind",
            TokenError::ReservedClaim(_) => "reserved_claim",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => TokenError::Unsupported,
            _ => TokenError::Malformed,
        }
    }
}

/// A verified, unexpired token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    pub subject: String,
    pub kind: TokenKind,
    pub id: Uuid,
    pub claims: Map<String, Value>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ParsedToken {
    /// Cross-check against a live identity: same subject and still unexpired.
    pub fn is_valid_for(&self, subject: &str, now: DateTime<Utc>) -> bool {
        self.subject == subject && now < self.expires_at
    }

    pub fn require_kind(self, expected: TokenKind) -> Result<Self, TokenError> {
        if self.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: self.kind,
            });
        }
        Ok(self)
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttls: TokenTtls,
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>, ttls: TokenTtls) -> Self {
        let secret = secret.as_ref();

        // Expiry is checked against the caller's clock in `validate_window`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttls,
        }
    }

    pub fn ttls(&self) -> &TokenTtls {
        &self.ttls
    }

    /// Sign `subject` plus `claims` for `ttl` starting at `now`.
    pub fn mint(
        &self,
        subject: &str,
        kind: TokenKind,
        claims: Map<String, Value>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if let Some(reserved) = RESERVED_CLAIMS.iter().find(|k| claims.contains_key(**k)) {
            return Err(TokenError::ReservedClaim((*reserved).to_string()));
        }
        if ttl <= Duration::zero() {
            return Err(TokenError::Encoding("ttl must be positive".to_string()));
        }

        let claims = TokenClaims {
            sub: subject.to_string(),
            kind,
            jti: Uuid::now_v7(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            extra: claims,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Access token for a principal; embeds `role` and `enabled`.
    pub fn mint_access(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, TokenError> {
        let mut claims = Map::new();
        claims.insert("role".to_string(), Value::from(principal.role.as_str()));
        claims.insert("enabled".to_string(), Value::from(principal.enabled));
        self.mint(&principal.email, TokenKind::Access, claims, self.ttls.access, now)
    }

    pub fn mint_refresh(&self, subject: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.mint(subject, TokenKind::Refresh, Map::new(), self.ttls.refresh, now)
    }

    pub fn mint_activation(&self, subject: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.mint(subject, TokenKind::Activation, Map::new(), self.ttls.activation, now)
    }

    pub fn mint_password_reset(&self, subject: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        self.mint(
            subject,
            TokenKind::PasswordReset,
            Map::new(),
            self.ttls.password_reset,
            now,
        )
    }

    /// Verify signature and expiry.
    pub fn parse(&self, token: &str, now: DateTime<Utc>) -> Result<ParsedToken, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;
        validate_window(&claims, now)?;

        let issued_at = claims.issued_at().ok_or(TokenError::Malformed)?;
        let expires_at = claims.expires_at().ok_or(TokenError::Malformed)?;

        Ok(ParsedToken {
            subject: claims.sub,
            kind: claims.kind,
            id: claims.jti,
            claims: claims.extra,
            issued_at,
            expires_at,
        })
    }

    /// [`Self::parse`] and require the token to have been minted as `expected`.
    pub fn parse_kind(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<ParsedToken, TokenError> {
        self.parse(token, now)?.require_kind(expected)
    }
}
