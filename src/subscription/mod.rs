use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use uuid::Uuid;

use crate::connection::state::ConnectionStatus;
use crate::types::symbol::Symbol;
use crate::types::tick::FusedTick;

pub type PriceCallback = Arc<dyn Fn(&FusedTick) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(&[ConnectionStatus]) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    fn generate() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

struct PriceEntry {
    id: SubscriptionId,
    callback: PriceCallback,
}

struct StatusEntry {
    id: SubscriptionId,
    callback: StatusCallback,
}

/// Per-symbol and global callback tables with registration-order delivery.
///
/// Delivery snapshots the callback list before iterating, so subscribing or
/// unsubscribing from inside a callback can never skip, duplicate, or panic
/// the remaining deliveries.
#[derive(Default)]
pub struct SubscriptionRegistry {
    price: Mutex<HashMap<Symbol, Vec<PriceEntry>>>,
    status: Mutex<Vec<StatusEntry>>,
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(SubscriptionRegistry::default())
    }

    pub fn subscribe_price(
        self: &Arc<Self>,
        symbol: Symbol,
        callback: PriceCallback,
    ) -> Subscription {
        let id = SubscriptionId::generate();
        if !self.closed.load(Ordering::SeqCst) {
            let mut price = self.price.lock().expect("price registry poisoned");
            price
                .entry(symbol)
                .or_default()
                .push(PriceEntry { id, callback });
        }
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub fn subscribe_status(self: &Arc<Self>, callback: StatusCallback) -> Subscription {
        let id = SubscriptionId::generate();
        if !self.closed.load(Ordering::SeqCst) {
            let mut status = self.status.lock().expect("status registry poisoned");
            status.push(StatusEntry { id, callback });
        }
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Fan a fused tick out to the symbol's subscribers in registration
    /// order.
    pub fn emit_price(&self, tick: &FusedTick) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let callbacks: Vec<PriceCallback> = {
            let price = self.price.lock().expect("price registry poisoned");
            match price.get(&tick.symbol) {
                Some(entries) => entries.iter().map(|e| e.callback.clone()).collect(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(tick);
        }
    }

    pub fn emit_status(&self, statuses: &[ConnectionStatus]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let callbacks: Vec<StatusCallback> = {
            let status = self.status.lock().expect("status registry poisoned");
            status.iter().map(|e| e.callback.clone()).collect()
        };
        for callback in callbacks {
            callback(statuses);
        }
    }

    /// Remove exactly one handle; a no-op when already removed.
    fn unsubscribe(&self, id: SubscriptionId) {
        {
            let mut price = self.price.lock().expect("price registry poisoned");
            for entries in price.values_mut() {
                entries.retain(|e| e.id != id);
            }
        }
        let mut status = self.status.lock().expect("status registry poisoned");
        status.retain(|e| e.id != id);
    }

    /// Close the registry: no further deliveries or registrations. Safe to
    /// call more than once.
    pub fn clear(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.price.lock().expect("price registry poisoned").clear();
        self.status.lock().expect("status registry poisoned").clear();
    }
}

/// Handle returned from subscribe calls. `unsubscribe` removes exactly one
/// registration and is idempotent; dropping the handle without calling it
/// leaves the callback registered, matching the service lifetime.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fused(symbol: &str, price: f64) -> FusedTick {
        FusedTick {
            symbol: Symbol::from(symbol),
            price,
            change_24h: 0.0,
            volume_24h: 0.0,
            source: "binance".to_string(),
            confidence: 95,
            source_ts: 0,
            received_at: 0,
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            let _sub = registry.subscribe_price(
                Symbol::from("BTC-USD"),
                Arc::new(move |_| order.lock().unwrap().push(tag)),
            );
        }

        registry.emit_price(&fused("BTC-USD", 1.0));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn delivery_is_per_symbol() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let _sub = registry.subscribe_price(
            Symbol::from("ETH-USD"),
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.emit_price(&fused("BTC-USD", 1.0));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        registry.emit_price(&fused("ETH-USD", 1.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_twice_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let sub = registry.subscribe_price(
            Symbol::from("BTC-USD"),
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sub.unsubscribe();
        sub.unsubscribe();
        registry.emit_price(&fused("BTC-USD", 1.0));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_mid_delivery_keeps_remaining_subscribers() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        // First callback unsubscribes itself during delivery.
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot2 = slot.clone();
        let self_removing = registry.subscribe_price(
            Symbol::from("BTC-USD"),
            Arc::new(move |_| {
                if let Some(sub) = slot2.lock().unwrap().take() {
                    sub.unsubscribe();
                }
            }),
        );
        *slot.lock().unwrap() = Some(self_removing);

        let hits2 = hits.clone();
        let _second = registry.subscribe_price(
            Symbol::from("BTC-USD"),
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.emit_price(&fused("BTC-USD", 1.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The self-removed callback is gone on the next delivery.
        registry.emit_price(&fused("BTC-USD", 1.0));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_stops_all_delivery() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let hits3 = hits.clone();
        let _price = registry.subscribe_price(
            Symbol::from("BTC-USD"),
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let _status = registry.subscribe_status(Arc::new(move |_| {
            hits3.fetch_add(1, Ordering::SeqCst);
        }));

        registry.clear();
        registry.clear(); // idempotent
        registry.emit_price(&fused("BTC-USD", 1.0));
        registry.emit_status(&[]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
