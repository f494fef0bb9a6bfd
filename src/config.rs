//! Configuration loader for the `crew-vitals` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, str::FromStr};

use anyhow::{anyhow, bail, Result};

use crate::identity::DEFAULT_LOOKUP_URL;

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Which document store backs the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    // ---
    /// PostgreSQL via sqlx.
    Postgres { db_url: String, db_pool_max: u32 },

    /// Process-local map; data is lost on restart.
    Memory,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Document store selection and its connection settings.
    pub store: StoreBackend,

    /// API key sent with every token lookup.
    pub identity_api_key: String,

    /// Token lookup endpoint.
    pub identity_lookup_url: String,

    /// TCP port the HTTP server listens on.
    pub port: u16,
}

/// Value of `VITALS_STORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => bail!("Invalid VITALS_STORE: '{}' (expected 'postgres' or 'memory')", other),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `IDENTITY_API_KEY` – key for the token lookup endpoint
/// - `DATABASE_URL` – PostgreSQL connection string (postgres store only)
///
/// Optional:
/// - `VITALS_STORE` – `postgres` (default) or `memory`
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `IDENTITY_LOOKUP_URL` – token lookup endpoint (default: Identity Toolkit)
/// - `PORT` – listen port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let kind = match env::var("VITALS_STORE") {
        Ok(v) => v.parse::<StoreKind>()?,
        Err(_) => StoreKind::Postgres,
    };

    let store = match kind {
        StoreKind::Postgres => StoreBackend::Postgres {
            db_url: require_env!("DATABASE_URL"),
            db_pool_max: parse_env!("DB_POOL_MAX", u32, 5),
        },
        StoreKind::Memory => StoreBackend::Memory,
    };

    let identity_api_key = require_env!("IDENTITY_API_KEY");
    let identity_lookup_url =
        env::var("IDENTITY_LOOKUP_URL").unwrap_or_else(|_| DEFAULT_LOOKUP_URL.to_string());
    let port = parse_env!("PORT", u16, 8080);

    Ok(Config {
        store,
        identity_api_key,
        identity_lookup_url,
        port,
    })
}

/// Replace the password in a connection URL with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks secrets (database password, identity API key) while showing
    /// all other configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        match &self.store {
            StoreBackend::Postgres {
                db_url,
                db_pool_max,
            } => {
                tracing::info!("  VITALS_STORE        : postgres");
                tracing::info!("  DATABASE_URL        : {}", mask_db_url(db_url));
                tracing::info!("  DB_POOL_MAX         : {}", db_pool_max);
            }
            StoreBackend::Memory => {
                tracing::warn!("  VITALS_STORE        : memory (records are not durable)");
            }
        }
        tracing::info!("  IDENTITY_API_KEY    : ****");
        tracing::info!("  IDENTITY_LOOKUP_URL : {}", self.identity_lookup_url);
        tracing::info!("  PORT                : {}", self.port);
    }
}
