//! Application context shared by all request handlers.
//!
//! Built once at startup by [`AppContext::initialize`] and read-only from
//! then on. Tests assemble one directly with [`AppContext::new`].

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;

use crate::config::{Config, StoreBackend};
use crate::identity::{IdentityToolkitVerifier, TokenVerifier};
use crate::schema;
use crate::store::{MemoryVitalsStore, PgVitalsStore, VitalsStore};

// ---

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn VitalsStore>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppContext {
    // ---
    pub fn new(store: Arc<dyn VitalsStore>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Connect the configured collaborators and return the ready context.
    pub async fn initialize(cfg: &Config) -> Result<Self> {
        // ---
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        let verifier = IdentityToolkitVerifier::new(
            http,
            cfg.identity_lookup_url.clone(),
            cfg.identity_api_key.clone(),
        );

        let store: Arc<dyn VitalsStore> = match &cfg.store {
            StoreBackend::Postgres {
                db_url,
                db_pool_max,
            } => {
                tracing::info!("Attempting to connect to database");

                let pool = PgPoolOptions::new()
                    .max_connections(*db_pool_max)
                    .connect(db_url)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

                tracing::info!("Successfully connected to database");

                schema::create_schema(&pool).await?;
                Arc::new(PgVitalsStore::new(pool))
            }
            StoreBackend::Memory => Arc::new(MemoryVitalsStore::new()),
        };

        Ok(Self::new(store, Arc::new(verifier)))
    }
}
