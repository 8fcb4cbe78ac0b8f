use config::{Config, Environment, File};
use serde::Deserialize;

use crate::config::{FallbackConfig, FeedConfig};
use crate::error::{Error, Result};
use crate::types::symbol::Symbol;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    pub symbols: Vec<Symbol>,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PRICEINFRA"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }
}
