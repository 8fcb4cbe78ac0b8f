use serde::Deserialize;
use serde_json::json;

use crate::adapters::{AdapterProtocol, SymbolMap};
use crate::types::symbol::Symbol;
use crate::types::tick::NormalizedTick;

pub struct BinanceAdapter {
    symbol_map: SymbolMap,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        BinanceAdapter {
            symbol_map: SymbolMap::from_pairs(&[
                ("BTC-USD", "BTCUSDT"),
                ("ETH-USD", "ETHUSDT"),
                ("SOL-USD", "SOLUSDT"),
            ]),
        }
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterProtocol for BinanceAdapter {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn trust_rank(&self) -> u8 {
        0
    }

    fn endpoint(&self) -> &str {
        "wss://stream.binance.com:9443/ws"
    }

    fn symbol_map(&self) -> &SymbolMap {
        &self.symbol_map
    }

    fn encode_subscribe(&self, symbols: &[Symbol]) -> Option<String> {
        let params: Vec<String> = symbols
            .iter()
            .filter_map(|s| self.symbol_map.native_for(s))
            .map(|native| format!("{}@ticker", native.to_lowercase()))
            .collect();

        if params.is_empty() {
            return None;
        }

        Some(
            json!({
                "method": "SUBSCRIBE",
                "params": params,
                "id": 1,
            })
            .to_string(),
        )
    }

    fn decode(&self, frame: &str) -> Option<NormalizedTick> {
        let data: BinanceTicker = serde_json::from_str(frame).ok()?;

        if data.event != "24hrTicker" {
            return None;
        }

        let symbol = self.symbol_map.canonical_for(&data.symbol)?.clone();
        let price: f64 = data.last_price.parse().ok()?;
        let change: f64 = data.change_pct.parse().ok()?;
        let volume: f64 = data.volume.parse().ok()?;

        NormalizedTick::new(symbol, price, change, volume, data.event_time)
    }
}

/// Binance 24hr ticker stream payload (single-letter field names are the
/// exchange's wire format).
#[derive(Deserialize)]
struct BinanceTicker {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "P")]
    change_pct: String,
    #[serde(rename = "v")]
    volume: String,
}
