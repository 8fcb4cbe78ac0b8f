use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::adapters::{AdapterProtocol, SymbolMap};
use crate::types::symbol::Symbol;
use crate::types::tick::NormalizedTick;
use crate::utils::helper::current_timestamp_ms;

pub struct CoinbaseAdapter {
    symbol_map: SymbolMap,
}

impl CoinbaseAdapter {
    pub fn new() -> Self {
        CoinbaseAdapter {
            symbol_map: SymbolMap::from_pairs(&[
                ("BTC-USD", "BTC-USD"),
                ("ETH-USD", "ETH-USD"),
                ("SOL-USD", "SOL-USD"),
            ]),
        }
    }
}

impl Default for CoinbaseAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterProtocol for CoinbaseAdapter {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    fn trust_rank(&self) -> u8 {
        1
    }

    fn endpoint(&self) -> &str {
        "wss://ws-feed.exchange.coinbase.com"
    }

    fn symbol_map(&self) -> &SymbolMap {
        &self.symbol_map
    }

    fn encode_subscribe(&self, symbols: &[Symbol]) -> Option<String> {
        let product_ids: Vec<&str> = symbols
            .iter()
            .filter_map(|s| self.symbol_map.native_for(s))
            .collect();

        if product_ids.is_empty() {
            return None;
        }

        Some(
            json!({
                "type": "subscribe",
                "product_ids": product_ids,
                "channels": ["ticker"],
            })
            .to_string(),
        )
    }

    fn decode(&self, frame: &str) -> Option<NormalizedTick> {
        let data: CoinbaseTicker = serde_json::from_str(frame).ok()?;

        if data.kind != "ticker" {
            return None;
        }

        let symbol = self.symbol_map.canonical_for(&data.product_id)?.clone();
        let price: f64 = data.price.parse().ok()?;
        let open: f64 = data.open_24h.parse().ok()?;
        let volume: f64 = data.volume_24h.parse().ok()?;

        // Coinbase sends the 24h open rather than a change figure.
        let change = if open > 0.0 {
            (price - open) / open * 100.0
        } else {
            0.0
        };

        let source_ts = data
            .time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis().max(0) as u64)
            .unwrap_or_else(current_timestamp_ms);

        NormalizedTick::new(symbol, price, change, volume, source_ts)
    }
}

#[derive(Deserialize)]
struct CoinbaseTicker {
    #[serde(rename = "type")]
    kind: String,
    product_id: String,
    price: String,
    open_24h: String,
    volume_24h: String,
    time: Option<String>,
}
