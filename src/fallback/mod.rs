pub mod coingecko;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn, Instrument};

use crate::error::Result;
use crate::observability::metrics;
use crate::observability::tracing::fallback_poll_span;
use crate::service::TickPipeline;
use crate::types::symbol::Symbol;
use crate::types::tick::{FusedTick, NormalizedTick};
use crate::utils::helper::current_timestamp_ms;

/// External polled price source used when the streaming feeds cannot
/// supply a fresh price. Implementations own their retry policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FallbackSource: Send + Sync {
    async fn fetch(&self, symbols: &[Symbol]) -> Result<Vec<NormalizedTick>>;
}

/// Watches per-symbol freshness on a fixed timer, independent of the
/// event-driven primary path, and injects polled fallback ticks for
/// symbols that have gone dark.
pub(crate) struct DegradedModeCoordinator {
    pipeline: Arc<TickPipeline>,
    source: Arc<dyn FallbackSource>,
    symbols: Vec<Symbol>,
    /// Adapter names covering each symbol, for the connectivity check.
    covering: HashMap<Symbol, Vec<String>>,
}

impl DegradedModeCoordinator {
    pub(crate) fn new(
        pipeline: Arc<TickPipeline>,
        source: Arc<dyn FallbackSource>,
        symbols: Vec<Symbol>,
        covering: HashMap<Symbol, Vec<String>>,
    ) -> Self {
        DegradedModeCoordinator {
            pipeline,
            source,
            symbols,
            covering,
        }
    }

    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.pipeline.config.fallback_poll_interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = timer.tick() => {}
            }
            self.poll_once().instrument(fallback_poll_span()).await;
        }
    }

    /// One timer firing: find degraded symbols, fetch, inject where no
    /// fresher primary tick exists.
    pub(crate) async fn poll_once(&self) {
        let now = current_timestamp_ms();
        let degraded: Vec<Symbol> = self
            .symbols
            .iter()
            .filter(|s| self.is_degraded(s, now))
            .cloned()
            .collect();
        if degraded.is_empty() {
            return;
        }

        metrics::FALLBACK_POLLS.inc();
        let ticks = match self.source.fetch(&degraded).await {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!(error = %e, "fallback fetch failed");
                return;
            }
        };

        let now = current_timestamp_ms();
        for tick in ticks {
            // Primary data always wins over fallback when both are fresh.
            if self.pipeline.aggregator.best_price_at(&tick.symbol, now).is_some() {
                continue;
            }
            let fused = FusedTick::from_fallback(
                tick,
                self.pipeline.config.fallback_confidence,
                now,
            );
            info!(symbol = %fused.symbol, price = fused.price, "injecting fallback tick");
            self.pipeline.aggregator.note_fused(&fused.symbol, now);
            metrics::FALLBACK_TICKS_INJECTED.inc();
            self.pipeline.registry.emit_price(&fused);
        }
    }

    /// A symbol is degraded when its fused output has gone stale or none
    /// of its covering adapters holds a live connection.
    fn is_degraded(&self, symbol: &Symbol, now: u64) -> bool {
        let stale = match self.pipeline.aggregator.last_fused(symbol) {
            Some(ts) => now.saturating_sub(ts) > self.pipeline.config.staleness_threshold_ms,
            None => true,
        };
        let live = self
            .covering
            .get(symbol)
            .map(|adapters| self.pipeline.status.any_connected(adapters))
            .unwrap_or(false);
        stale || !live
    }
}
