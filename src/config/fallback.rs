use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::symbol::Symbol;

/// External polled price source reached over REST when the primary feeds
/// cannot supply a fresh price.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FallbackConfig {
    pub base_url: String,
    /// Canonical symbol -> provider coin id (e.g. "BTC-USD" -> "bitcoin").
    pub symbol_ids: HashMap<Symbol, String>,
    pub request_timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        let mut symbol_ids = HashMap::new();
        symbol_ids.insert(Symbol::from("BTC-USD"), "bitcoin".to_string());
        symbol_ids.insert(Symbol::from("ETH-USD"), "ethereum".to_string());
        symbol_ids.insert(Symbol::from("SOL-USD"), "solana".to_string());

        FallbackConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            symbol_ids,
            request_timeout_ms: 10_000,
        }
    }
}
