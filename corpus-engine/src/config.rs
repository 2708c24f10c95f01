//! Layered worker configuration (§1.1): built-in defaults → `config.toml`
//! → environment variables → explicit overrides, mirroring the teacher's
//! `RuntimeConfig`/`dotenvy` pairing but resolved through the `config`
//! crate instead of hand-rolled env lookups, since this worker's surface
//! is large enough to want a real layering engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineRuntimeError, Result};

/// Resolved worker configuration. Logged once at startup via
/// `tracing::info!` (§3.1) so a support session can reconstruct behavior
/// after the fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub database_url: String,
    pub object_store_root: String,
    pub claim_interval_secs: u64,
    pub retry_pass_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_cap_minutes: u64,
    pub signed_url_ttl_secs: u64,
    pub signed_url_secret: String,
    pub enabled_engines: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://corpus.db".to_string(),
            object_store_root: "./data/objects".to_string(),
            claim_interval_secs: 5,
            retry_pass_interval_secs: 30,
            heartbeat_interval_secs: 5,
            max_retries: 5,
            retry_backoff_cap_minutes: 30,
            signed_url_ttl_secs: 900,
            signed_url_secret: "dev-only-insecure-secret".to_string(),
            enabled_engines: vec![
                "semantic_similarity".to_string(),
                "contradiction_detection".to_string(),
                "thematic_bridge".to_string(),
            ],
        }
    }
}

impl WorkerConfig {
    pub fn claim_interval(&self) -> Duration {
        Duration::from_secs(self.claim_interval_secs)
    }

    pub fn retry_pass_interval(&self) -> Duration {
        Duration::from_secs(self.retry_pass_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn retry_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_cap_minutes * 60)
    }

    /// Loads config.toml (if present), layers `CORPUS_*` environment
    /// variables on top, then applies the binary's explicit overrides.
    /// `dotenvy::dotenv()` is invoked first so a `.env` file populates the
    /// process environment before the `config` crate's `Environment`
    /// source reads it, matching the teacher's own
    /// `dotenvy::dotenv().ok()` + `std::env::var` pattern in
    /// `RuntimeConfig::resolve_sqlite_db_name`.
    pub fn load(config_path: Option<&str>, overrides: WorkerConfigOverrides) -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = WorkerConfig::default();
        let mut builder = config::Config::builder()
            .set_default("database_url", defaults.database_url.clone())
            .map_err(config_error)?
            .set_default("object_store_root", defaults.object_store_root.clone())
            .map_err(config_error)?
            .set_default("claim_interval_secs", defaults.claim_interval_secs as i64)
            .map_err(config_error)?
            .set_default(
                "retry_pass_interval_secs",
                defaults.retry_pass_interval_secs as i64,
            )
            .map_err(config_error)?
            .set_default(
                "heartbeat_interval_secs",
                defaults.heartbeat_interval_secs as i64,
            )
            .map_err(config_error)?
            .set_default("max_retries", defaults.max_retries as i64)
            .map_err(config_error)?
            .set_default(
                "retry_backoff_cap_minutes",
                defaults.retry_backoff_cap_minutes as i64,
            )
            .map_err(config_error)?
            .set_default("signed_url_ttl_secs", defaults.signed_url_ttl_secs as i64)
            .map_err(config_error)?
            .set_default("signed_url_secret", defaults.signed_url_secret.clone())
            .map_err(config_error)?
            .set_default("enabled_engines", defaults.enabled_engines.clone())
            .map_err(config_error)?;

        builder = builder.add_source(config::File::with_name(config_path.unwrap_or("config")).required(false));
        builder = builder.add_source(config::Environment::with_prefix("CORPUS").separator("__"));

        let resolved = builder.build().map_err(config_error)?;
        let mut worker_config: WorkerConfig = resolved.try_deserialize().map_err(config_error)?;

        overrides.apply(&mut worker_config);
        Ok(worker_config)
    }
}

fn config_error(err: config::ConfigError) -> EngineRuntimeError {
    EngineRuntimeError::Config(err.to_string())
}

/// Explicit overrides passed to the binary (CLI flags), the highest
/// layer in the override order.
#[derive(Clone, Debug, Default)]
pub struct WorkerConfigOverrides {
    pub database_url: Option<String>,
    pub object_store_root: Option<String>,
}

impl WorkerConfigOverrides {
    fn apply(self, config: &mut WorkerConfig) {
        if let Some(database_url) = self.database_url {
            config.database_url = database_url;
        }
        if let Some(object_store_root) = self.object_store_root {
            config.object_store_root = object_store_root;
        }
    }
}
