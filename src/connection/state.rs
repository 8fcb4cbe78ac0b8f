use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::helper::current_timestamp_ms;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    /// Legal transitions of the per-adapter state machine. Disconnected is
    /// reachable from anywhere via explicit shutdown or clean close; every
    /// other edge is enumerated.
    pub fn can_transition(self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Error)
                | (Connected, Reconnecting)
                | (Connecting, Reconnecting)
                | (Error, Reconnecting)
                | (Reconnecting, Connecting)
                | (_, Disconnected)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time view of one adapter's connection. Recomputed wholesale on
/// every transition; readers never observe a partial update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub adapter: String,
    pub state: ConnectionState,
    pub last_update: u64,
    pub latency_ms: Option<u64>,
    pub reconnect_attempts: u32,
    pub error: Option<String>,
}

impl ConnectionStatus {
    fn initial(adapter: String) -> Self {
        ConnectionStatus {
            adapter,
            state: ConnectionState::Disconnected,
            last_update: current_timestamp_ms(),
            latency_ms: None,
            reconnect_attempts: 0,
            error: None,
        }
    }
}

/// Status table for all managed adapters, keyed by adapter name. Owned by
/// the connection layer; everyone else sees value snapshots.
pub struct StatusTable {
    order: Vec<String>,
    entries: DashMap<String, ConnectionStatus>,
}

impl StatusTable {
    pub fn new(adapter_names: Vec<String>) -> Self {
        let entries = DashMap::new();
        for name in &adapter_names {
            entries.insert(name.clone(), ConnectionStatus::initial(name.clone()));
        }
        StatusTable {
            order: adapter_names,
            entries,
        }
    }

    /// Drive the state machine for one adapter, replacing its status entry
    /// atomically. Illegal transitions are logged and dropped rather than
    /// applied.
    pub fn transition(
        &self,
        adapter: &str,
        to: ConnectionState,
        error: Option<String>,
    ) -> bool {
        let Some(mut entry) = self.entries.get_mut(adapter) else {
            return false;
        };
        let from = entry.state;
        if !from.can_transition(to) {
            warn!(adapter, %from, %to, "ignoring illegal connection state transition");
            return false;
        }

        let mut next = entry.clone();
        next.state = to;
        next.last_update = current_timestamp_ms();
        next.error = error;
        if to == ConnectionState::Connected {
            next.reconnect_attempts = 0;
        }
        *entry = next;
        true
    }

    pub fn record_latency(&self, adapter: &str, latency_ms: u64) {
        if let Some(mut entry) = self.entries.get_mut(adapter) {
            let mut next = entry.clone();
            next.latency_ms = Some(latency_ms);
            next.last_update = current_timestamp_ms();
            *entry = next;
        }
    }

    pub fn record_reconnect_attempt(&self, adapter: &str, attempts: u32) {
        if let Some(mut entry) = self.entries.get_mut(adapter) {
            let mut next = entry.clone();
            next.reconnect_attempts = attempts;
            next.last_update = current_timestamp_ms();
            *entry = next;
        }
    }

    /// Full current snapshot, in adapter registration order.
    pub fn snapshot(&self) -> Vec<ConnectionStatus> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|e| e.clone()))
            .collect()
    }

    pub fn state_of(&self, adapter: &str) -> Option<ConnectionState> {
        self.entries.get(adapter).map(|e| e.state)
    }

    pub fn any_connected(&self, adapters: &[String]) -> bool {
        adapters
            .iter()
            .any(|a| self.state_of(a) == Some(ConnectionState::Connected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn transition_matrix() {
        assert!(Disconnected.can_transition(Connecting));
        assert!(Connecting.can_transition(Connected));
        assert!(Connected.can_transition(Error));
        assert!(Connected.can_transition(Reconnecting));
        assert!(Error.can_transition(Reconnecting));
        assert!(Reconnecting.can_transition(Connecting));
        // Shutdown reaches Disconnected from anywhere.
        assert!(Connected.can_transition(Disconnected));
        assert!(Reconnecting.can_transition(Disconnected));

        assert!(!Disconnected.can_transition(Connected));
        assert!(!Reconnecting.can_transition(Connected));
        assert!(!Error.can_transition(Connected));
        assert!(!Disconnected.can_transition(Reconnecting));
    }

    #[test]
    fn table_applies_legal_transitions_only() {
        let table = StatusTable::new(vec!["binance".to_string()]);
        assert!(table.transition("binance", Connecting, None));
        assert!(table.transition("binance", Connected, None));
        // Connected -> Connecting is not an edge.
        assert!(!table.transition("binance", Connecting, None));
        assert_eq!(table.state_of("binance"), Some(Connected));
    }

    #[test]
    fn connected_resets_attempt_counter() {
        let table = StatusTable::new(vec!["binance".to_string()]);
        table.transition("binance", Connecting, None);
        table.transition("binance", Error, Some("refused".to_string()));
        table.record_reconnect_attempt("binance", 3);
        table.transition("binance", Reconnecting, None);
        table.transition("binance", Connecting, None);
        table.transition("binance", Connected, None);

        let snapshot = table.snapshot();
        assert_eq!(snapshot[0].reconnect_attempts, 0);
        assert_eq!(snapshot[0].state, Connected);
        assert!(snapshot[0].error.is_none());
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let table = StatusTable::new(vec![
            "binance".to_string(),
            "coinbase".to_string(),
            "kraken".to_string(),
        ]);
        let names: Vec<String> = table.snapshot().into_iter().map(|s| s.adapter).collect();
        assert_eq!(names, vec!["binance", "coinbase", "kraken"]);
    }

    #[test]
    fn any_connected_checks_the_given_subset() {
        let table = StatusTable::new(vec!["binance".to_string(), "kraken".to_string()]);
        table.transition("binance", Connecting, None);
        table.transition("binance", Connected, None);
        assert!(table.any_connected(&["binance".to_string()]));
        assert!(!table.any_connected(&["kraken".to_string()]));
    }
}
