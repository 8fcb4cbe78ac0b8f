pub mod binance;
pub mod coinbase;
pub mod kraken;

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::symbol::Symbol;
use crate::types::tick::NormalizedTick;

/// Capabilities of one external price-feed source: its identity and trust
/// rank, its wire endpoint, its symbol naming, how to ask it for ticks and
/// how to read what it sends back.
///
/// Decoders are synchronous and infallible at the boundary: a frame either
/// yields a `NormalizedTick` or is dropped. Parse failures must never
/// escape an implementation.
pub trait AdapterProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Static trust rank; lower is more trusted.
    fn trust_rank(&self) -> u8;

    fn endpoint(&self) -> &str;

    fn symbol_map(&self) -> &SymbolMap;

    /// One subscription payload covering the given canonical symbols.
    /// Symbols this adapter does not carry are silently skipped; returns
    /// `None` when nothing remains to subscribe to.
    fn encode_subscribe(&self, symbols: &[Symbol]) -> Option<String>;

    /// Decode one inbound frame into a canonical tick, or reject it.
    fn decode(&self, frame: &str) -> Option<NormalizedTick>;
}

/// Bidirectional canonical <-> source-native symbol mapping for one
/// adapter. Many canonical symbols may be unsupported by a given adapter.
#[derive(Clone, Debug, Default)]
pub struct SymbolMap {
    to_native: HashMap<Symbol, String>,
    to_canonical: HashMap<String, Symbol>,
}

impl SymbolMap {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut map = SymbolMap::default();
        for (canonical, native) in pairs {
            let symbol = Symbol::from(*canonical);
            map.to_native.insert(symbol.clone(), native.to_string());
            map.to_canonical.insert(native.to_string(), symbol);
        }
        map
    }

    pub fn native_for(&self, symbol: &Symbol) -> Option<&str> {
        self.to_native.get(symbol).map(String::as_str)
    }

    pub fn canonical_for(&self, native: &str) -> Option<&Symbol> {
        self.to_canonical.get(native)
    }

    pub fn supports(&self, symbol: &Symbol) -> bool {
        self.to_native.contains_key(symbol)
    }

    /// The subset of `symbols` this map carries, in input order.
    pub fn covered(&self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|s| self.supports(s))
            .cloned()
            .collect()
    }
}

/// The static adapter registry, ordered by ascending trust rank.
pub fn default_adapters() -> Vec<Arc<dyn AdapterProtocol>> {
    vec![
        Arc::new(binance::BinanceAdapter::new()),
        Arc::new(coinbase::CoinbaseAdapter::new()),
        Arc::new(kraken::KrakenAdapter::new()),
    ]
}
