use anyhow::Context;
use tracing::{info, warn};

use gatekeeper_api::{app, config::ApiConfig};
use gatekeeper_infra::{ExpirySweeper, ensure_admin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatekeeper_observability::init();

    let config = ApiConfig::from_env()?;
    info!(?config, "configuration loaded");

    let (services, app) = app::build_app(&config).await?;

    if let Some(seed) = &config.admin {
        match ensure_admin(services.store.as_ref(), services.hasher, &seed.email, &seed.password).await {
            Ok(Some(_)) => {}
            Ok(None) => info!(email = %seed.email, "bootstrap administrator already present"),
            Err(e) => warn!(error = %e, "admin bootstrap failed"),
        }
    }

    let sweeper = ExpirySweeper::new(services.store.clone(), config.sweeper.clone()).spawn();

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
