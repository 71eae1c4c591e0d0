use gatekeeper_auth::{AuthenticatedPrincipal, PrincipalId, Role};

/// Principal context for a request (resolved identity + the bearer token it
/// was resolved from).
///
/// Inserted into request extensions by the authorization middleware; absent
/// on public paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: AuthenticatedPrincipal,
    token: String,
}

impl PrincipalContext {
    pub fn new(principal: AuthenticatedPrincipal, token: impl Into<String>) -> Self {
        Self {
            principal,
            token: token.into(),
        }
    }

    pub fn principal(&self) -> &AuthenticatedPrincipal {
        &self.principal
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.id
    }

    pub fn email(&self) -> &str {
        &self.principal.email
    }

    /// The single authority of the principal.
    pub fn role(&self) -> Role {
        self.principal.role
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}
