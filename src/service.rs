use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::adapters::AdapterProtocol;
use crate::config::FeedConfig;
use crate::connection::manager;
use crate::connection::state::{ConnectionStatus, StatusTable};
use crate::fallback::{DegradedModeCoordinator, FallbackSource};
use crate::fusion::aggregator::FusionCache;
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::types::symbol::Symbol;
use crate::types::tick::FusedTick;
use crate::utils::task_supervisor::TaskSupervisor;

/// Everything the per-adapter sessions and the degraded-mode coordinator
/// share: the fusion cache, the callback registries and the status table.
/// Each field is internally synchronized; components communicate only
/// through these, never into each other's storage.
pub(crate) struct TickPipeline {
    pub(crate) config: FeedConfig,
    pub(crate) aggregator: FusionCache,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) status: StatusTable,
}

/// The price-feed service: one set of feed connections shared by any
/// number of consumers.
///
/// Explicitly constructed and explicitly owned; clone it to hand more
/// consumers a handle to the same connections. Whoever created it calls
/// `disconnect` when done; there is no hidden global instance.
#[derive(Clone)]
pub struct PriceFeedService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    pipeline: Arc<TickPipeline>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<TaskSupervisor>,
    closed: AtomicBool,
}

impl PriceFeedService {
    /// Open one connection per adapter that carries at least one requested
    /// symbol, start the degraded-mode poller, and return promptly: all
    /// connection establishment happens in the background and failures
    /// surface only through status callbacks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        adapters: Vec<Arc<dyn AdapterProtocol>>,
        symbols: Vec<Symbol>,
        config: FeedConfig,
        fallback: Arc<dyn FallbackSource>,
    ) -> Self {
        for symbol in &symbols {
            if !adapters.iter().any(|a| a.symbol_map().supports(symbol)) {
                warn!(%symbol, "no adapter covers this symbol; it will never produce ticks");
            }
        }

        let active: Vec<Arc<dyn AdapterProtocol>> = adapters
            .into_iter()
            .filter(|a| !a.symbol_map().covered(&symbols).is_empty())
            .collect();

        let mut covering: HashMap<Symbol, Vec<String>> = HashMap::new();
        for adapter in &active {
            for symbol in adapter.symbol_map().covered(&symbols) {
                covering
                    .entry(symbol)
                    .or_default()
                    .push(adapter.name().to_string());
            }
        }

        let pipeline = Arc::new(TickPipeline {
            aggregator: FusionCache::new(config.freshness_window_ms, config.divergence_threshold),
            registry: SubscriptionRegistry::new(),
            status: StatusTable::new(active.iter().map(|a| a.name().to_string()).collect()),
            config,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut supervisor = TaskSupervisor::new();

        manager::spawn_sessions(&active, &symbols, &pipeline, &shutdown_rx, &mut supervisor);

        let coordinator = DegradedModeCoordinator::new(
            pipeline.clone(),
            fallback,
            symbols.clone(),
            covering,
        );
        supervisor.spawn("fallback-poller", coordinator.run(shutdown_rx));

        info!(
            adapters = active.len(),
            symbols = symbols.len(),
            "price feed service started"
        );

        PriceFeedService {
            inner: Arc::new(ServiceInner {
                pipeline,
                shutdown_tx,
                supervisor: Mutex::new(supervisor),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a callback for fused ticks of one symbol. Delivery is in
    /// registration order; the returned handle's `unsubscribe` is
    /// idempotent.
    pub fn on_price(
        &self,
        symbol: Symbol,
        callback: impl Fn(&FusedTick) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner
            .pipeline
            .registry
            .subscribe_price(symbol, Arc::new(callback))
    }

    /// Register a callback for connection-status snapshots. The current
    /// snapshot is delivered immediately so a new subscriber is never left
    /// without state.
    pub fn on_status(
        &self,
        callback: impl Fn(&[ConnectionStatus]) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Arc<dyn Fn(&[ConnectionStatus]) + Send + Sync> = Arc::new(callback);
        if !self.inner.closed.load(Ordering::SeqCst) {
            callback(&self.inner.pipeline.status.snapshot());
        }
        self.inner.pipeline.registry.subscribe_status(callback)
    }

    /// Current status snapshot, in adapter registration order.
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.inner.pipeline.status.snapshot()
    }

    /// Tear everything down: close every connection, cancel every pending
    /// reconnect and poll timer, clear every cache and callback table.
    /// Runs exactly once; repeated calls are safe no-ops.
    pub async fn disconnect(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Silence subscribers first so nothing observes the teardown.
        self.inner.pipeline.registry.clear();
        let _ = self.inner.shutdown_tx.send(true);

        let mut supervisor = self.inner.supervisor.lock().await;
        supervisor.shutdown_all(Duration::from_secs(2)).await;

        self.inner.pipeline.aggregator.clear();
        info!("price feed service disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::error::Result;
    use crate::types::tick::NormalizedTick;

    struct NoopFallback;

    #[async_trait::async_trait]
    impl FallbackSource for NoopFallback {
        async fn fetch(&self, _symbols: &[Symbol]) -> Result<Vec<NormalizedTick>> {
            Ok(Vec::new())
        }
    }

    fn service_for(symbols: &[&str]) -> PriceFeedService {
        PriceFeedService::connect(
            crate::adapters::default_adapters(),
            symbols.iter().map(|s| Symbol::from(*s)).collect(),
            FeedConfig::default(),
            Arc::new(NoopFallback),
        )
    }

    #[tokio::test]
    async fn status_subscribers_get_an_immediate_snapshot() {
        let service = service_for(&["BTC-USD"]);
        let snapshots = Arc::new(StdMutex::new(Vec::new()));
        let sink = snapshots.clone();
        let _sub = service.on_status(move |statuses| {
            sink.lock().unwrap().push(statuses.to_vec());
        });

        let snapshots = snapshots.lock().unwrap();
        assert!(!snapshots.is_empty());
        let names: Vec<&str> = snapshots[0].iter().map(|s| s.adapter.as_str()).collect();
        assert_eq!(names, vec!["binance", "coinbase", "kraken"]);
        drop(snapshots);

        service.disconnect().await;
    }

    #[tokio::test]
    async fn uncovered_symbols_start_no_connections() {
        let service = service_for(&["UNOBTANIUM-USD"]);
        assert!(service.statuses().is_empty());
        service.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_silences_callbacks() {
        let service = service_for(&["BTC-USD"]);
        let status_count = Arc::new(StdMutex::new(0usize));
        let sink = status_count.clone();
        let _sub = service.on_status(move |_| {
            *sink.lock().unwrap() += 1;
        });
        let after_registration = *status_count.lock().unwrap();
        assert!(after_registration >= 1);

        service.disconnect().await;
        service.disconnect().await;

        // A late subscriber gets nothing, not even the immediate snapshot.
        let late = Arc::new(StdMutex::new(0usize));
        let sink = late.clone();
        let _late_sub = service.on_status(move |_| {
            *sink.lock().unwrap() += 1;
        });
        assert_eq!(*late.lock().unwrap(), 0);
    }
}
