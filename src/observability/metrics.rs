use lazy_static::lazy_static;
use prometheus::{
    Counter, Histogram, HistogramOpts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Pipeline metrics
    pub static ref TICKS_NORMALIZED: Counter = Counter::new(
        "ticks_normalized_total",
        "Total frames decoded into canonical ticks"
    ).unwrap();

    pub static ref FRAMES_REJECTED: Counter = Counter::new(
        "frames_rejected_total",
        "Total inbound frames dropped by decoders"
    ).unwrap();

    pub static ref FUSED_EMITTED: Counter = Counter::new(
        "fused_ticks_emitted_total",
        "Total fused ticks delivered to subscribers"
    ).unwrap();

    // Connection metrics
    pub static ref RECONNECTS_SCHEDULED: Counter = Counter::new(
        "reconnects_scheduled_total",
        "Total reconnect attempts scheduled"
    ).unwrap();

    // Fallback metrics
    pub static ref FALLBACK_POLLS: Counter = Counter::new(
        "fallback_polls_total",
        "Total degraded-mode fallback fetches"
    ).unwrap();

    pub static ref FALLBACK_TICKS_INJECTED: Counter = Counter::new(
        "fallback_ticks_injected_total",
        "Total fallback ticks delivered to subscribers"
    ).unwrap();

    // Latency metrics
    pub static ref SOURCE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "tick_source_latency_seconds",
            "Source-emit to local-receive latency"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY.register(Box::new(TICKS_NORMALIZED.clone())).unwrap();
    REGISTRY.register(Box::new(FRAMES_REJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(FUSED_EMITTED.clone())).unwrap();
    REGISTRY.register(Box::new(RECONNECTS_SCHEDULED.clone())).unwrap();
    REGISTRY.register(Box::new(FALLBACK_POLLS.clone())).unwrap();
    REGISTRY.register(Box::new(FALLBACK_TICKS_INJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(SOURCE_LATENCY.clone())).unwrap();
}
