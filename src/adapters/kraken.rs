use serde_json::{json, Value};

use crate::adapters::{AdapterProtocol, SymbolMap};
use crate::types::symbol::Symbol;
use crate::types::tick::NormalizedTick;
use crate::utils::helper::current_timestamp_ms;

pub struct KrakenAdapter {
    symbol_map: SymbolMap,
}

impl KrakenAdapter {
    pub fn new() -> Self {
        KrakenAdapter {
            symbol_map: SymbolMap::from_pairs(&[
                ("BTC-USD", "XBT/USD"),
                ("ETH-USD", "ETH/USD"),
                ("SOL-USD", "SOL/USD"),
            ]),
        }
    }
}

impl Default for KrakenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterProtocol for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken"
    }

    fn trust_rank(&self) -> u8 {
        2
    }

    fn endpoint(&self) -> &str {
        "wss://ws.kraken.com"
    }

    fn symbol_map(&self) -> &SymbolMap {
        &self.symbol_map
    }

    fn encode_subscribe(&self, symbols: &[Symbol]) -> Option<String> {
        let pairs: Vec<&str> = symbols
            .iter()
            .filter_map(|s| self.symbol_map.native_for(s))
            .collect();

        if pairs.is_empty() {
            return None;
        }

        Some(
            json!({
                "event": "subscribe",
                "pair": pairs,
                "subscription": { "name": "ticker" },
            })
            .to_string(),
        )
    }

    // Kraken ticker frames are positional arrays:
    //   [channelID, {"c": [...], "v": [...], "o": [...]}, "ticker", "XBT/USD"]
    // Event frames (heartbeat, subscriptionStatus) are objects and fall out
    // of the array checks.
    fn decode(&self, frame: &str) -> Option<NormalizedTick> {
        let value: Value = serde_json::from_str(frame).ok()?;
        let items = value.as_array()?;
        if items.len() < 4 {
            return None;
        }

        if items[2].as_str()? != "ticker" {
            return None;
        }
        let symbol = self.symbol_map.canonical_for(items[3].as_str()?)?.clone();

        let payload = items[1].as_object()?;
        let price: f64 = str_at(payload.get("c")?, 0)?.parse().ok()?;
        let volume: f64 = str_at(payload.get("v")?, 1)?.parse().ok()?;
        let open: f64 = str_at(payload.get("o")?, 1)?.parse().ok()?;

        let change = if open > 0.0 {
            (price - open) / open * 100.0
        } else {
            0.0
        };

        // Kraken ticker frames carry no event timestamp; stamp at receipt.
        NormalizedTick::new(symbol, price, change, volume, current_timestamp_ms())
    }
}

fn str_at(value: &Value, index: usize) -> Option<&str> {
    value.as_array()?.get(index)?.as_str()
}
