use axum::{routing::get, Router};

pub mod admin;
pub mod auth;
pub mod home;
pub mod system;

/// Router for every endpoint. Authentication is applied around it by the
/// caller; public paths are decided by the authorizer's allow-list.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/whoami", get(system::whoami))
        .nest("/auth", auth::router())
        .nest("/home", home::router())
        .nest("/admin", admin::router())
}
