//! Handler-side role guard.
//!
//! Authentication happens in the middleware; this only checks the resolved
//! principal's single authority against what a route requires.

use axum::http::StatusCode;
use axum::response::Response;

use gatekeeper_auth::{Role, authorize_role};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// `Ok` if the principal holds exactly `role`, else a 403 response.
pub fn require_role(principal: &PrincipalContext, role: Role) -> Result<(), Response> {
    authorize_role(principal.principal(), role)
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

#[cfg(test)]
mod tests {
    use gatekeeper_auth::{AuthenticatedPrincipal, PrincipalId};

    use super::*;

    fn ctx(role: Role) -> PrincipalContext {
        PrincipalContext::new(
            AuthenticatedPrincipal {
                id: PrincipalId::from_i64(7),
                email: "x@example.com".into(),
                role,
            },
            "token",
        )
    }

    #[test]
    fn exact_role_passes() {
        assert!(require_role(&ctx(Role::Admin), Role::Admin).is_ok());
    }

    #[test]
    fn other_roles_are_forbidden() {
        let res = require_role(&ctx(Role::Admin), Role::Doctor).unwrap_err();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = require_role(&ctx(Role::User), Role::Admin).unwrap_err();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
