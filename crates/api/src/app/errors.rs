use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use gatekeeper_auth::TokenError;
use gatekeeper_infra::AuthError;

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::PasswordMismatch => {
            json_error(StatusCode::BAD_REQUEST, "password_mismatch", err.to_string())
        }
        AuthError::EmailExists => json_error(StatusCode::CONFLICT, "email_exists", err.to_string()),
        AuthError::InvalidCredentials => {
            json_error(StatusCode::BAD_REQUEST, "invalid_credentials", err.to_string())
        }
        AuthError::AccountLocked => json_error(StatusCode::LOCKED, "account_locked", err.to_string()),
        AuthError::AccountDisabled => {
            json_error(StatusCode::FORBIDDEN, "account_disabled", err.to_string())
        }
        AuthError::PrincipalNotFound => {
            json_error(StatusCode::NOT_FOUND, "principal_not_found", err.to_string())
        }
        AuthError::Token(e) => token_error_to_response(e),
        AuthError::Unauthorized => unauthorized(),
        AuthError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        AuthError::Validation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
        }
        AuthError::Store(e) => {
            error!(error = %e, "store failure");
            internal_error()
        }
        AuthError::Internal(msg) => {
            error!(error = %msg, "internal failure");
            internal_error()
        }
    }
}

/// Tokens passed in a path or body of a public route.
fn token_error_to_response(err: TokenError) -> axum::response::Response {
    let code = match &err {
        TokenError::Expired => "token_expired",
        TokenError::Malformed | TokenError::WrongKind { .. } => "token_malformed",
        TokenError::InvalidSignature => "token_invalid_signature",
        TokenError::Unsupported => "token_unsupported",
        TokenError::ReservedClaim(_) | TokenError::Encoding(_) => {
            error!(error = %err, "token minting failed");
            return internal_error();
        }
    };
    let message = match err {
        TokenError::WrongKind { .. } => TokenError::Malformed.to_string(),
        other => other.to_string(),
    };
    json_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn unauthorized() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required")
}

pub fn internal_error() -> axum::response::Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal server error",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use gatekeeper_auth::TokenKind;
    use gatekeeper_infra::StoreError;

    use super::*;

    fn status(err: AuthError) -> StatusCode {
        auth_error_to_response(err).status()
    }

    #[test]
    fn service_errors_map_to_documented_statuses() {
        assert_eq!(status(AuthError::PasswordMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::EmailExists), StatusCode::CONFLICT);
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::AccountLocked), StatusCode::LOCKED);
        assert_eq!(status(AuthError::AccountDisabled), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::PrincipalNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(AuthError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status(AuthError::Validation("bad email".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn token_failures_on_public_routes_are_bad_requests() {
        for err in [
            TokenError::Expired,
            TokenError::Malformed,
            TokenError::InvalidSignature,
            TokenError::Unsupported,
            TokenError::WrongKind {
                expected: TokenKind::Activation,
                found: TokenKind::Access,
            },
        ] {
            assert_eq!(status(AuthError::Token(err)), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn internal_failures_are_generic() {
        assert_eq!(
            status(AuthError::Store(StoreError::Backend("db down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AuthError::Token(TokenError::Encoding("boom".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AuthError::Internal("join error".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
