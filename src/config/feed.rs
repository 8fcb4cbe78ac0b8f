use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the fusion pipeline and connection lifecycle. The thresholds
/// here are operational knobs, not invariants; the defaults match the
/// values the system was tuned with.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum age at which a cached scored tick still participates in
    /// aggregation.
    pub freshness_window_ms: u64,
    /// Age of the last fused emission past which a symbol is considered
    /// degraded.
    pub staleness_threshold_ms: u64,
    /// Relative deviation of the primary from the fresh-set mean above
    /// which the aggregator prefers the mean.
    pub divergence_threshold: f64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub fallback_poll_interval_ms: u64,
    /// Confidence assigned to injected fallback ticks.
    pub fallback_confidence: u8,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            freshness_window_ms: 30_000,
            staleness_threshold_ms: 60_000,
            divergence_threshold: 0.005, // 0.5%
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            fallback_poll_interval_ms: 15_000,
            fallback_confidence: 60,
        }
    }
}

impl FeedConfig {
    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_ms)
    }
}
