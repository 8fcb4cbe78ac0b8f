use serde::{Deserialize, Serialize};

use crate::types::symbol::Symbol;

/// Source label used when the aggregator synthesizes a consensus price.
pub const AGGREGATED_SOURCE: &str = "aggregated";

/// Source label used for ticks injected by the degraded-mode coordinator.
pub const FALLBACK_SOURCE: &str = "fallback";

/// A decoded, validated tick in canonical form. Adapter decoders either
/// produce one of these or drop the frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTick {
    pub symbol: Symbol,
    pub price: f64,
    /// 24h change in percent, signed.
    pub change_24h: f64,
    pub volume_24h: f64,
    /// Source-emitted timestamp, milliseconds since epoch.
    pub source_ts: u64,
}

impl NormalizedTick {
    /// Validating constructor. Invariants: price > 0 and finite,
    /// volume >= 0. Ticks failing these are rejected, not forwarded.
    pub fn new(
        symbol: Symbol,
        price: f64,
        change_24h: f64,
        volume_24h: f64,
        source_ts: u64,
    ) -> Option<Self> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        if !volume_24h.is_finite() || volume_24h < 0.0 {
            return None;
        }
        if !change_24h.is_finite() {
            return None;
        }
        Some(NormalizedTick {
            symbol,
            price,
            change_24h,
            volume_24h,
            source_ts,
        })
    }
}

/// A normalized tick enriched with its source identity, observed transport
/// latency and a confidence score. Cached at key (symbol, source).
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredTick {
    pub tick: NormalizedTick,
    pub source: String,
    pub latency_ms: u64,
    pub confidence: u8,
    /// Local receive time, milliseconds since epoch. Freshness is judged
    /// against this, not the source timestamp.
    pub received_at: u64,
}

/// The aggregator's reconciled output for one symbol: what subscribers
/// receive. Immutable once constructed; delivered by copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedTick {
    pub symbol: Symbol,
    pub price: f64,
    pub change_24h: f64,
    pub volume_24h: f64,
    /// Adapter name, `AGGREGATED_SOURCE` or `FALLBACK_SOURCE`.
    pub source: String,
    pub confidence: u8,
    pub source_ts: u64,
    pub received_at: u64,
}

impl FusedTick {
    /// Pass-through fusion: the highest-confidence source wins unchanged.
    pub fn from_scored(scored: &ScoredTick) -> Self {
        FusedTick {
            symbol: scored.tick.symbol.clone(),
            price: scored.tick.price,
            change_24h: scored.tick.change_24h,
            volume_24h: scored.tick.volume_24h,
            source: scored.source.clone(),
            confidence: scored.confidence,
            source_ts: scored.tick.source_ts,
            received_at: scored.received_at,
        }
    }

    /// Tick injected from the polled fallback path.
    pub fn from_fallback(tick: NormalizedTick, confidence: u8, received_at: u64) -> Self {
        FusedTick {
            symbol: tick.symbol,
            price: tick.price,
            change_24h: tick.change_24h,
            volume_24h: tick.volume_24h,
            source: FALLBACK_SOURCE.to_string(),
            confidence,
            source_ts: tick.source_ts,
            received_at,
        }
    }
}
