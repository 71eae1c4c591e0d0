//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and service construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// The full router over already-built services.
///
/// The authorizer wraps every route; anything not on the public allow-list
/// needs a valid access token.
pub fn router(services: Arc<AppServices>) -> Router {
    let authorizer = Arc::new(services.authorizer());

    routes::router()
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            authorizer,
            middleware::authorize_request,
        )))
}

/// Build services from configuration and return them with the router.
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<(Arc<AppServices>, Router)> {
    let services = Arc::new(services::build_services(config).await?);
    let app = router(services.clone());
    Ok((services, app))
}
