use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::FallbackConfig;
use crate::error::{Error, Result};
use crate::fallback::FallbackSource;
use crate::types::symbol::Symbol;
use crate::types::tick::NormalizedTick;
use crate::utils::helper::current_timestamp_ms;

/// Request/response price lookup against CoinGecko's `/simple/price`
/// endpoint. Used by the degraded-mode coordinator only; never on the hot
/// path.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
    /// Canonical symbol -> CoinGecko coin id.
    symbol_ids: HashMap<Symbol, String>,
}

impl CoinGeckoSource {
    pub fn new(config: &FallbackConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_default();

        // Layered config sources may lowercase map keys.
        let symbol_ids = config
            .symbol_ids
            .iter()
            .map(|(symbol, id)| (Symbol::new(symbol.as_str().to_uppercase()), id.clone()))
            .collect();

        CoinGeckoSource {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            symbol_ids,
        }
    }
}

#[async_trait]
impl FallbackSource for CoinGeckoSource {
    async fn fetch(&self, symbols: &[Symbol]) -> Result<Vec<NormalizedTick>> {
        let ids: Vec<&str> = symbols
            .iter()
            .filter_map(|s| self.symbol_ids.get(s).map(String::as_str))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/simple/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("ids", ids.join(",").as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_vol", "true"),
                ("include_24hr_change", "true"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::FallbackError(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let prices: HashMap<String, SimplePriceData> = response.json().await?;
        debug!(coins = prices.len(), "fallback price lookup returned");

        let now = current_timestamp_ms();
        let ticks = symbols
            .iter()
            .filter_map(|symbol| {
                let id = self.symbol_ids.get(symbol)?;
                let data = prices.get(id)?;
                NormalizedTick::new(
                    symbol.clone(),
                    data.usd,
                    data.usd_24h_change.unwrap_or(0.0),
                    data.usd_24h_vol.unwrap_or(0.0),
                    now,
                )
            })
            .collect();

        Ok(ticks)
    }
}

#[derive(Debug, Deserialize)]
struct SimplePriceData {
    usd: f64,
    #[serde(default)]
    usd_24h_vol: Option<f64>,
    #[serde(default)]
    usd_24h_change: Option<f64>,
}
