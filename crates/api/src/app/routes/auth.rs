//! Registration, login, token refresh, logout, activation and password reset.
//!
//! Everything here except `/logout` is on the public allow-list.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use gatekeeper_infra::{AuthError, TokenPair};

use crate::app::dto::{
    AuthenticateRequest, ForgotPasswordRequest, MessageResponse, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, TokenResponse,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/authenticate", post(authenticate))
        .route("/refresh-token", post(refresh_token))
        .route("/enable-user/:token", post(enable_user))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", post(reset_password))
        .route("/logout", post(logout))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let registration = match req.into_registration() {
        Ok(r) => r,
        Err(e) => return errors::auth_error_to_response(e.into()),
    };

    match services.session.register(registration).await {
        Ok(account) => (
            StatusCode::OK,
            Json(RegisterResponse {
                message: "registered; check your email to activate the account".to_string(),
                principal_id: account.principal.id,
                activation_token: account.activation_token,
            }),
        )
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn authenticate(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<AuthenticateRequest>,
) -> Response {
    match services.session.authenticate(&req.email, &req.password).await {
        Ok(pair) => token_response(pair),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// The refresh token travels in the `Authorization` header.
async fn refresh_token(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match services.session.refresh(authorization).await {
        Ok(pair) => token_response(pair),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn enable_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
) -> Response {
    match services.session.enable_account(&token).await {
        Ok(_) => Json(MessageResponse::new("account activated")).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Response {
    // The token only leaves the service through the notifier.
    match services.session.request_password_reset(&req.email).await {
        Ok(_) => Json(MessageResponse::new("password reset link sent")).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Response {
    match services
        .session
        .update_password(&token, &req.password, &req.password_confirm)
        .await
    {
        Ok(()) => Json(MessageResponse::new("password updated")).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services.session.logout(principal.token()).await {
        Ok(()) => Json(MessageResponse::new("logged out")).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// Token body plus the access token echoed in the `Authorization` header.
fn token_response(pair: TokenPair) -> Response {
    let header_value = match HeaderValue::from_str(&format!("Bearer {}", pair.access_token)) {
        Ok(v) => v,
        Err(e) => {
            return errors::auth_error_to_response(AuthError::Internal(e.to_string()));
        }
    };

    (
        StatusCode::OK,
        [(header::AUTHORIZATION, header_value)],
        Json(TokenResponse::from(pair)),
    )
        .into_response()
}
