use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn, Instrument};

use crate::adapters::AdapterProtocol;
use crate::connection::state::ConnectionState;
use crate::error::{Error, Result};
use crate::fusion::scorer;
use crate::observability::metrics;
use crate::observability::tracing::adapter_session_span;
use crate::service::TickPipeline;
use crate::types::symbol::Symbol;
use crate::types::tick::ScoredTick;
use crate::utils::helper::current_timestamp_ms;
use crate::utils::task_supervisor::TaskSupervisor;

/// Backoff before reconnect attempt `attempt` (1-based):
/// min(base * 2^(attempt-1), cap). The cap bounds the delay, not the
/// attempt count; reconnection retries indefinitely until shutdown.
pub fn reconnect_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let delay = base_ms.saturating_mul(1u64 << exp).min(max_ms);
    Duration::from_millis(delay)
}

/// Spawn one supervised connection task per adapter that carries at least
/// one of the requested symbols.
pub(crate) fn spawn_sessions(
    adapters: &[Arc<dyn AdapterProtocol>],
    symbols: &[Symbol],
    pipeline: &Arc<TickPipeline>,
    shutdown: &watch::Receiver<bool>,
    supervisor: &mut TaskSupervisor,
) {
    for adapter in adapters {
        let covered = adapter.symbol_map().covered(symbols);
        if covered.is_empty() {
            debug!(adapter = adapter.name(), "no requested symbols on this feed, skipping");
            continue;
        }

        let session = Arc::new(AdapterSession {
            adapter: adapter.clone(),
            symbols: covered,
            pipeline: pipeline.clone(),
            attempts: AtomicU32::new(0),
        });
        let span = adapter_session_span(adapter.name());
        supervisor.spawn(
            format!("conn:{}", adapter.name()),
            session.run(shutdown.clone()).instrument(span),
        );
    }
}

enum SessionEnd {
    /// Server closed with code 1000; intentional, no reconnect.
    CleanClose,
    /// Transport failed or the server went away; reconnect.
    Lost,
    /// Local shutdown requested; socket already closed.
    Shutdown,
}

/// One adapter's long-lived connection: connect, subscribe, pump frames
/// into the fusion pipeline, and reconnect with exponential backoff until
/// told to stop.
pub(crate) struct AdapterSession {
    adapter: Arc<dyn AdapterProtocol>,
    /// Canonical symbols this adapter was asked for and supports.
    symbols: Vec<Symbol>,
    pipeline: Arc<TickPipeline>,
    attempts: AtomicU32,
}

impl AdapterSession {
    pub(crate) async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                self.transition(ConnectionState::Disconnected, None);
                return;
            }

            self.transition(ConnectionState::Connecting, None);
            match self.open_session(&mut shutdown).await {
                Ok(SessionEnd::CleanClose) | Ok(SessionEnd::Shutdown) => {
                    self.transition(ConnectionState::Disconnected, None);
                    return;
                }
                Ok(SessionEnd::Lost) => {}
                Err(e) => {
                    self.transition(ConnectionState::Error, Some(e.to_string()));
                }
            }

            if *shutdown.borrow() {
                self.transition(ConnectionState::Disconnected, None);
                return;
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.pipeline
                .status
                .record_reconnect_attempt(self.adapter.name(), attempt);
            self.transition(ConnectionState::Reconnecting, None);
            metrics::RECONNECTS_SCHEDULED.inc();

            let delay = reconnect_delay(
                attempt,
                self.pipeline.config.reconnect_base_delay_ms,
                self.pipeline.config.reconnect_max_delay_ms,
            );
            warn!(
                adapter = self.adapter.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "connection lost, reconnect scheduled"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => {
                    self.transition(ConnectionState::Disconnected, None);
                    return;
                }
            }
        }
    }

    /// Drive one connection from dial to termination. Transport errors
    /// surface through the status table, never to the caller's caller.
    async fn open_session(&self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        let (ws, _) = connect_async(self.adapter.endpoint())
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        if let Some(payload) = self.adapter.encode_subscribe(&self.symbols) {
            sink.send(Message::Text(payload))
                .await
                .map_err(|e| Error::WebSocket(e.to_string()))?;
        }

        self.attempts.store(0, Ordering::SeqCst);
        self.transition(ConnectionState::Connected, None);
        info!(
            adapter = self.adapter.name(),
            symbols = self.symbols.len(),
            "connected and subscribed"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(close))) => {
                        let clean = close
                            .as_ref()
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(false);
                        if clean {
                            info!(adapter = self.adapter.name(), "server closed cleanly");
                            return Ok(SessionEnd::CleanClose);
                        }
                        return Ok(SessionEnd::Lost);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.transition(ConnectionState::Error, Some(e.to_string()));
                        return Ok(SessionEnd::Lost);
                    }
                    None => return Err(Error::ConnectionClosed),
                }
            }
        }
    }

    /// Decode, score, cache and fan out one inbound frame. A frame that
    /// fails anywhere in here is dropped; the connection stays healthy.
    fn handle_frame(&self, text: &str) {
        let Some(tick) = self.adapter.decode(text) else {
            metrics::FRAMES_REJECTED.inc();
            return;
        };
        if !self.symbols.contains(&tick.symbol) {
            metrics::FRAMES_REJECTED.inc();
            return;
        }

        let now = current_timestamp_ms();
        let latency_ms = now.saturating_sub(tick.source_ts);
        metrics::TICKS_NORMALIZED.inc();
        metrics::SOURCE_LATENCY.observe(latency_ms as f64 / 1_000.0);
        self.pipeline
            .status
            .record_latency(self.adapter.name(), latency_ms);

        let confidence = scorer::score(self.adapter.trust_rank(), latency_ms);
        let symbol = tick.symbol.clone();
        self.pipeline.aggregator.ingest(ScoredTick {
            tick,
            source: self.adapter.name().to_string(),
            latency_ms,
            confidence,
            received_at: now,
        });

        if let Some(fused) = self.pipeline.aggregator.best_price(&symbol) {
            self.pipeline.aggregator.note_fused(&symbol, now);
            metrics::FUSED_EMITTED.inc();
            self.pipeline.registry.emit_price(&fused);
        }
    }

    fn transition(&self, to: ConnectionState, error: Option<String>) {
        if self.pipeline.status.transition(self.adapter.name(), to, error) {
            self.pipeline
                .registry
                .emit_status(&self.pipeline.status.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delay_sequence_doubles_then_caps() {
        let delays: Vec<u64> = (1..=8)
            .map(|n| reconnect_delay(n, 1_000, 30_000).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        assert_eq!(reconnect_delay(0, 1_000, 30_000), Duration::from_millis(1_000));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(attempt in any::<u32>()) {
            let delay = reconnect_delay(attempt, 1_000, 30_000);
            prop_assert!(delay <= Duration::from_millis(30_000));
            prop_assert!(delay >= Duration::from_millis(1_000));
        }
    }
}
