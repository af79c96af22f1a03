use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use restohub_core::RestError;
use restohub_infra::store::{
    InMemoryInvitationStore, InMemoryPrincipalStore, InMemorySessionStore, PgInvitationStore,
    PgPrincipalStore, PgSessionStore, ensure_schema,
};
use restohub_infra::{
    AppConfig, CookieSettings, InMemoryVerifierCache, InvitationStore, PrincipalStore,
    ProviderRegistry, SessionLifecycle, SessionStore,
};

/// Shared services handed to every handler through an `Extension` layer.
pub struct AppServices {
    pub lifecycle: Arc<SessionLifecycle>,
    pub principals: Arc<dyn PrincipalStore>,
    pub invitations: Arc<dyn InvitationStore>,
    pub cookie: CookieSettings,
    pub invitation_ttl: chrono::Duration,
}

impl AppServices {
    /// Wire services from configuration: Postgres stores when `DATABASE_URL`
    /// is set, in-memory stores otherwise.
    pub async fn from_config(config: &AppConfig) -> Result<Self, RestError> {
        let providers = ProviderRegistry::from_env(config.http_timeout);
        if providers.is_empty() {
            warn!("no SSO provider configured; every login will be rejected");
        }

        match &config.database_url {
            Some(url) => {
                let pool = PgPool::connect(url)
                    .await
                    .map_err(|e| RestError::internal("failed to connect to database").with_cause(e))?;
                ensure_schema(&pool).await?;
                info!("using postgres stores");
                Ok(Self::with_stores(
                    config,
                    providers,
                    Arc::new(PgPrincipalStore::new(pool.clone())),
                    Arc::new(PgSessionStore::new(pool.clone())),
                    Arc::new(PgInvitationStore::new(pool)),
                ))
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory stores");
                Ok(Self::in_memory(config, providers))
            }
        }
    }

    pub fn in_memory(config: &AppConfig, providers: ProviderRegistry) -> Self {
        Self::with_stores(
            config,
            providers,
            Arc::new(InMemoryPrincipalStore::new()),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryInvitationStore::new()),
        )
    }

    pub fn with_stores(
        config: &AppConfig,
        providers: ProviderRegistry,
        principals: Arc<dyn PrincipalStore>,
        sessions: Arc<dyn SessionStore>,
        invitations: Arc<dyn InvitationStore>,
    ) -> Self {
        let lifecycle = SessionLifecycle::new(
            providers,
            Arc::new(InMemoryVerifierCache::new(config.verifier_ttl)),
            principals.clone(),
            sessions,
            invitations.clone(),
        );

        Self {
            lifecycle: Arc::new(lifecycle),
            principals,
            invitations,
            cookie: config.cookie.clone(),
            invitation_ttl: config.invitation_ttl,
        }
    }
}
