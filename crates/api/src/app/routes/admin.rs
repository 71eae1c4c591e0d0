//! Account administration (ROLE_ADMIN only).
//!
//! The role check is enforced by `AccountAdmin`; handlers only translate
//! between HTTP and the service.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

use gatekeeper_infra::LockFilter;

use crate::app::dto::{MessageResponse, PrincipalResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/locked", get(list_locked))
        .route("/users/unlocked", get(list_unlocked))
        .route("/users/:email", delete(delete_user))
        .route("/users/:email/lock", post(lock_user))
        .route("/users/:email/unlock", post(unlock_user))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<PrincipalContext>,
) -> Response {
    list(&services, &actor, LockFilter::All).await
}

async fn list_locked(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<PrincipalContext>,
) -> Response {
    list(&services, &actor, LockFilter::Locked).await
}

async fn list_unlocked(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<PrincipalContext>,
) -> Response {
    list(&services, &actor, LockFilter::Unlocked).await
}

async fn list(services: &AppServices, actor: &PrincipalContext, filter: LockFilter) -> Response {
    match services.admin.list(actor.principal(), filter).await {
        Ok(principals) => Json(
            principals
                .into_iter()
                .map(PrincipalResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<PrincipalContext>,
    Path(email): Path<String>,
) -> Response {
    match services.admin.delete(actor.principal(), &email).await {
        Ok(()) => Json(MessageResponse::new(format!("deleted {email}"))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn lock_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<PrincipalContext>,
    Path(email): Path<String>,
) -> Response {
    match services.admin.lock(actor.principal(), &email).await {
        Ok(principal) => Json(PrincipalResponse::from(principal)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn unlock_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<PrincipalContext>,
    Path(email): Path<String>,
) -> Response {
    match services.admin.unlock(actor.principal(), &email).await {
        Ok(principal) => Json(PrincipalResponse::from(principal)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
