use serde::{Deserialize, Serialize};

use gatekeeper_core::{PrincipalId, TokenId};

/// Revocation record of one persisted token.
///
/// Access, activation and password reset tokens are recorded. A principal has
/// at most one valid access token; a pending reset token is the exception to
/// "one valid record per principal" and stays valid next to it until used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub id: TokenId,
    pub token: String,
    pub revoked: bool,
    pub expired: bool,
    pub principal_id: PrincipalId,
}

impl IssuedToken {
    /// Neither revoked nor expired.
    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.expired
    }

    pub fn revoke(&mut self) {
        self.revoked = true;
        self.expired = true;
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is case-sensitive; an empty token is rejected.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Bearer   abc  "), Some("abc"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("bearer abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn revoke_sets_both_flags() {
        let mut record = IssuedToken {
            id: TokenId::from_i64(1),
            token: "t".into(),
            revoked: false,
            expired: false,
            principal_id: PrincipalId::from_i64(1),
        };
        assert!(record.is_valid());
        record.revoke();
        assert!(record.revoked && record.expired && !record.is_valid());
    }
}
