use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use gatekeeper_auth::{PasswordHasher, TokenCodec};
use gatekeeper_infra::{
    AccountAdmin, AuthSessionService, AuthStore, InMemoryAuthStore, LogNotifier, Notifier,
    PostgresAuthStore,
};

use crate::config::ApiConfig;
use crate::middleware::RequestAuthorizer;

/// Everything a handler needs, shared behind one `Arc`.
pub struct AppServices {
    pub session: AuthSessionService,
    pub admin: AccountAdmin,
    pub store: Arc<dyn AuthStore>,
    pub hasher: PasswordHasher,
}

impl AppServices {
    /// Wire services over an already-built store.
    pub fn new(config: &ApiConfig, store: Arc<dyn AuthStore>, notifier: Arc<dyn Notifier>) -> Self {
        let codec = TokenCodec::new(config.jwt_secret.as_bytes(), config.token_ttls);
        let session = AuthSessionService::new(
            store.clone(),
            codec,
            config.hasher,
            notifier,
            config.policy.clone(),
        );

        Self {
            session,
            admin: AccountAdmin::new(store.clone()),
            store,
            hasher: config.hasher,
        }
    }

    /// The request authorizer over the same codec and store as the session service.
    pub fn authorizer(&self) -> RequestAuthorizer {
        RequestAuthorizer::new(self.session.codec().clone(), self.store.clone())
    }
}

/// Pick the store backend from configuration: Postgres when `DATABASE_URL`
/// is set, in-memory otherwise.
pub async fn build_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn AuthStore>> {
    let Some(url) = config.database_url.as_deref() else {
        info!("using in-memory auth store");
        return Ok(Arc::new(InMemoryAuthStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to DATABASE_URL")?;

    let store = PostgresAuthStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("failed to apply auth schema")?;

    info!("using postgres auth store");
    Ok(Arc::new(store))
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    Ok(AppServices::new(config, store, Arc::new(LogNotifier)))
}
