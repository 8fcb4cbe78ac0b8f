use dashmap::DashMap;

use crate::types::symbol::Symbol;
use crate::types::tick::{FusedTick, ScoredTick, AGGREGATED_SOURCE};
use crate::utils::helper::current_timestamp_ms;

/// Confidence ceiling for synthesized consensus ticks.
const AGGREGATED_CONFIDENCE_CAP: u8 = 95;

/// Short-horizon cache of the latest scored tick per (symbol, source) and
/// the aggregation over it.
///
/// Entries are superseded in place by any later tick from the same pair and
/// expire once older than the freshness window. Expiry is enforced at read
/// time; stale entries are excluded from aggregation but not proactively
/// deleted.
pub struct FusionCache {
    entries: DashMap<(Symbol, String), ScoredTick>,
    /// Receive time of the last fused emission per symbol, primary or
    /// fallback. The degraded-mode coordinator judges staleness against
    /// this.
    last_fused: DashMap<Symbol, u64>,
    freshness_window_ms: u64,
    divergence_threshold: f64,
}

impl FusionCache {
    pub fn new(freshness_window_ms: u64, divergence_threshold: f64) -> Self {
        FusionCache {
            entries: DashMap::new(),
            last_fused: DashMap::new(),
            freshness_window_ms,
            divergence_threshold,
        }
    }

    /// Replace the cached tick for (symbol, source) wholesale.
    pub fn ingest(&self, tick: ScoredTick) {
        let key = (tick.tick.symbol.clone(), tick.source.clone());
        self.entries.insert(key, tick);
    }

    /// Recompute the single best price for `symbol` from the currently
    /// fresh entries, or `None` when no usable data survives.
    pub fn best_price(&self, symbol: &Symbol) -> Option<FusedTick> {
        self.best_price_at(symbol, current_timestamp_ms())
    }

    pub(crate) fn best_price_at(&self, symbol: &Symbol, now: u64) -> Option<FusedTick> {
        let mut fresh: Vec<ScoredTick> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == *symbol)
            .filter(|entry| now.saturating_sub(entry.value().received_at) < self.freshness_window_ms)
            .map(|entry| entry.value().clone())
            .collect();

        if fresh.is_empty() {
            return None;
        }

        fresh.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then(b.received_at.cmp(&a.received_at))
        });
        let primary = &fresh[0];

        if fresh.len() >= 2 {
            let mean = fresh.iter().map(|t| t.tick.price).sum::<f64>() / fresh.len() as f64;
            let deviation = (primary.tick.price - mean).abs() / mean;

            // Prefer the flock over a single outlier: a lone diverging
            // source cannot dictate the fused price.
            if deviation > self.divergence_threshold {
                return Some(FusedTick {
                    symbol: symbol.clone(),
                    price: mean,
                    change_24h: primary.tick.change_24h,
                    volume_24h: primary.tick.volume_24h,
                    source: AGGREGATED_SOURCE.to_string(),
                    confidence: (primary.confidence.saturating_add(10))
                        .min(AGGREGATED_CONFIDENCE_CAP),
                    source_ts: primary.tick.source_ts,
                    received_at: primary.received_at,
                });
            }
        }

        Some(FusedTick::from_scored(primary))
    }

    /// Record that a fused tick for `symbol` was delivered at `ts`.
    pub fn note_fused(&self, symbol: &Symbol, ts: u64) {
        self.last_fused.insert(symbol.clone(), ts);
    }

    pub fn last_fused(&self, symbol: &Symbol) -> Option<u64> {
        self.last_fused.get(symbol).map(|e| *e.value())
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.last_fused.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tick::NormalizedTick;

    const NOW: u64 = 1_700_000_100_000;

    fn cache() -> FusionCache {
        FusionCache::new(30_000, 0.005)
    }

    fn scored(source: &str, price: f64, confidence: u8, received_at: u64) -> ScoredTick {
        ScoredTick {
            tick: NormalizedTick::new(Symbol::from("BTC-USD"), price, 1.0, 100.0, received_at)
                .unwrap(),
            source: source.to_string(),
            latency_ms: 50,
            confidence,
            received_at,
        }
    }

    #[test]
    fn empty_cache_yields_none() {
        assert!(cache().best_price_at(&Symbol::from("BTC-USD"), NOW).is_none());
    }

    #[test]
    fn single_source_passes_through() {
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 100, NOW - 1_000));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        assert_eq!(fused.price, 50_000.0);
        assert_eq!(fused.source, "binance");
        assert_eq!(fused.confidence, 100);
    }

    #[test]
    fn agreement_within_threshold_emits_primary() {
        // A at 50000 (conf 100), B at 50100: 0.1% off the 50050 mean.
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 100, NOW - 1_000));
        cache.ingest(scored("coinbase", 50_100.0, 95, NOW - 1_000));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        assert_eq!(fused.price, 50_000.0);
        assert_eq!(fused.source, "binance");
    }

    #[test]
    fn divergent_primary_is_replaced_by_mean() {
        // A at 50000, B at 60000: primary deviates ~9% from the 55000 mean.
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 100, NOW - 1_000));
        cache.ingest(scored("coinbase", 60_000.0, 95, NOW - 1_000));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        assert_eq!(fused.price, 55_000.0);
        assert_eq!(fused.source, AGGREGATED_SOURCE);
        assert!(fused.confidence <= 95);
    }

    #[test]
    fn aggregated_confidence_is_primary_plus_ten_capped() {
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 80, NOW - 1_000));
        cache.ingest(scored("coinbase", 60_000.0, 75, NOW - 1_000));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        assert_eq!(fused.confidence, 90);

        cache.ingest(scored("binance", 50_000.0, 92, NOW - 500));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        assert_eq!(fused.confidence, 95);
    }

    #[test]
    fn stale_entries_are_excluded_not_deleted() {
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 100, NOW - 31_000));
        assert!(cache.best_price_at(&Symbol::from("BTC-USD"), NOW).is_none());
        // Read-time expiry is idempotent: asking again changes nothing.
        assert!(cache.best_price_at(&Symbol::from("BTC-USD"), NOW).is_none());
        // The entry is still cached and usable at an earlier read point.
        assert!(cache
            .best_price_at(&Symbol::from("BTC-USD"), NOW - 5_000)
            .is_some());
    }

    #[test]
    fn stale_source_does_not_drag_the_mean() {
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 100, NOW - 1_000));
        cache.ingest(scored("coinbase", 60_000.0, 95, NOW - 31_000));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        // Only binance survives the freshness filter.
        assert_eq!(fused.price, 50_000.0);
        assert_eq!(fused.source, "binance");
    }

    #[test]
    fn later_tick_supersedes_same_source() {
        let cache = cache();
        cache.ingest(scored("binance", 50_000.0, 100, NOW - 2_000));
        cache.ingest(scored("binance", 50_500.0, 100, NOW - 1_000));
        let fused = cache.best_price_at(&Symbol::from("BTC-USD"), NOW).unwrap();
        assert_eq!(fused.price, 50_500.0);
    }

    #[test]
    fn tracks_last_fused_emission() {
        let cache = cache();
        let symbol = Symbol::from("BTC-USD");
        assert_eq!(cache.last_fused(&symbol), None);
        cache.note_fused(&symbol, NOW);
        assert_eq!(cache.last_fused(&symbol), Some(NOW));
        cache.clear();
        assert_eq!(cache.last_fused(&symbol), None);
    }
}
