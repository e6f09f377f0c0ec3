//! Builds an `AppConfig` from the `config/` directory and the environment.
//! Sources are layered with `figment`: `base.toml`, then `{environment}.toml`,
//! then `APP_`-prefixed env variables (`APP_WORKER_CONFIG__NUM_WORKERS=8`).

mod error;
mod types;

use std::{path::Path, sync::OnceLock};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::info;

pub use error::{ConfigError, ConfigResult};
pub use types::{AppConfig, DbConfig, Environment, NetConfig, SslRequire, WorkerConfig};

impl AppConfig {
    /// Loads the configuration for the environment named by `APP_ENVIRONMENT` (defaults to `local`)
    /// from the `config/` directory under the current working directory.
    pub fn load() -> ConfigResult<Self> {
        let environment: Environment = std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .try_into()?;
        let config_dir = std::env::current_dir()?.join("config");

        let mut config = Self::load_from(&config_dir, environment)?;

        // Setup DbConfig for production
        if matches!(environment, Environment::Production) {
            let production_db = std::env::var("DATABASE_URL")?;
            config.db_config = DbConfig::try_from(production_db.as_str())?;
        }

        Ok(config)
    }

    /// Layers `base.toml`, the environment specific file and `APP_` env variables.
    pub fn load_from(config_dir: &Path, environment: Environment) -> ConfigResult<Self> {
        let environment_filename = format!("{}.toml", environment.as_ref().to_lowercase());

        let config = Figment::new()
            .merge(Toml::file(config_dir.join("base.toml")))
            .merge(Toml::file(config_dir.join(environment_filename)))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()?;

        Ok(config)
    }
}

/// Allocates a static `OnceLock` containing `AppConfig`.
/// This ensures configuration only gets initialized the first time we call this function.
/// Every other caller gets a &'static ref to AppConfig.
/// Panics if anything goes wrong.
pub fn get_or_init_config() -> &'static AppConfig {
    static CONFIG_INIT: OnceLock<AppConfig> = OnceLock::new();
    CONFIG_INIT.get_or_init(|| {
        info!(
            "{:<20} - Initializing the configuration",
            "get_or_init_config"
        );
        AppConfig::load().unwrap_or_else(|er| panic!("Fatal Error: Building config: {er}"))
    })
}
