use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use gatekeeper_auth::Role;

use crate::app::dto::MessageResponse;
use crate::authz::require_role;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/user", get(user_home))
        .route("/doctor", get(doctor_home))
        .route("/admin", get(admin_home))
}

async fn home(Extension(principal): Extension<PrincipalContext>) -> Response {
    Json(MessageResponse::new(format!("Hello, {}", principal.email()))).into_response()
}

async fn user_home(Extension(principal): Extension<PrincipalContext>) -> Response {
    greet(&principal, Role::User)
}

async fn doctor_home(Extension(principal): Extension<PrincipalContext>) -> Response {
    greet(&principal, Role::Doctor)
}

async fn admin_home(Extension(principal): Extension<PrincipalContext>) -> Response {
    greet(&principal, Role::Admin)
}

fn greet(principal: &PrincipalContext, role: Role) -> Response {
    if let Err(forbidden) = require_role(principal, role) {
        return forbidden;
    }
    Json(MessageResponse::new(format!(
        "Hello {}, you are signed in as {}",
        principal.email(),
        role.as_str()
    )))
    .into_response()
}
