use thiserror::Error;

use crate::{AuthenticatedPrincipal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing authority '{}'", .0.authority())]
    Forbidden(Role),
}

/// Require `required` as the principal's authority.
///
/// - No IO
/// - No panics
/// - Roles are not hierarchical: ADMIN does not imply USER.
pub fn authorize_role(principal: &AuthenticatedPrincipal, required: Role) -> Result<(), AuthzError> {
    if principal.role == required {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::PrincipalId;

    fn principal(role: Role) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            id: PrincipalId::from_i64(1),
            email: "a@x.com".into(),
            role,
        }
    }

    #[test]
    fn matching_role_is_allowed() {
        assert_eq!(authorize_role(&principal(Role::Doctor), Role::Doctor), Ok(()));
    }

    #[test]
    fn roles_are_not_hierarchical() {
        assert_eq!(
            authorize_role(&principal(Role::Admin), Role::User),
            Err(AuthzError::Forbidden(Role::User))
        );
    }
}
