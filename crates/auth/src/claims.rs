use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::codec::TokenError;

/// Purpose a token was minted for.
///
/// Each use site accepts exactly one kind, so an activation link cannot be
/// replayed as a bearer token and a refresh token cannot authorize requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Activation,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Activation => "activation",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire claims of every token this service signs.
///
/// `extra` carries caller-supplied claims (e.g. `role`, `enabled` on access
/// tokens) flattened next to the registered ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub kind: TokenKind,
    pub jti: Uuid,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claim names owned by the codec; callers may not set them through `extra`.
pub const RESERVED_CLAIMS: [&str; 5] = ["sub", "kind", "jti", "iat", "exp"];

impl TokenClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Deterministically validate the time window of decoded claims.
///
/// Signature verification happens before this, in [`crate::TokenCodec`].
pub fn validate_window(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.exp <= claims.iat {
        return Err(TokenError::Malformed);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, exp: i64) -> TokenClaims {
        TokenClaims {
            sub: "a@x.com".into(),
            kind: TokenKind::Access,
            jti: Uuid::now_v7(),
            iat,
            exp,
            extra: Map::new(),
        }
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        let now = Utc::now();
        let c = claims(now.timestamp(), now.timestamp());
        assert_eq!(validate_window(&c, now), Err(TokenError::Malformed));
    }

    #[test]
    fn window_expires_at_exact_boundary() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let c = claims(now.timestamp() - 10, now.timestamp());
        assert_eq!(validate_window(&c, now), Err(TokenError::Expired));

        let c = claims(now.timestamp() - 10, now.timestamp() + 1);
        assert_eq!(validate_window(&c, now), Ok(()));
    }

    #[test]
    fn extra_claims_flatten_on_the_wire() {
        let mut c = claims(1, 2);
        c.extra.insert("role".into(), Value::from("ADMIN"));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["role"], "ADMIN");
        assert_eq!(json["kind"], "access");

        let back: TokenClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back.extra.get("role"), Some(&Value::from("ADMIN")));
    }
}
