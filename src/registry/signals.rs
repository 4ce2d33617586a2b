//! Signal Registry
//!
//! The core data structure of the relay: the bounded, insertion-ordered set
//! of active signals plus the per-customer record of which signal ids have
//! already been delivered. Every operation takes the registry's single lock
//! for the whole read-modify sequence, which is what makes delivery
//! at-most-once even under concurrent polls.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::{AnnotatedSignal, Signal};

use super::errors::RelayError;

/// Aggregate counters reported by `get_stats`
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub active_signals: usize,
    pub customers_served: usize,
    pub total_deliveries: usize,
    /// Tail of the active set, newest last
    pub recent_signals: Vec<Signal>,
}

struct RegistryInner {
    /// Active signals in insertion order; index 0 is the oldest
    active: VecDeque<Signal>,
    /// Per-customer set of delivered signal ids
    delivered: HashMap<String, HashSet<String>>,
}

/// Thread-safe registry of active signals and delivery records
pub struct SignalRegistry {
    inner: Mutex<RegistryInner>,
    max_active: usize,
}

impl SignalRegistry {
    /// Create a registry bounded at `max_active` signals
    pub fn new(max_active: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                active: VecDeque::new(),
                delivered: HashMap::new(),
            }),
            max_active,
        }
    }

    /// Append a validated signal to the active set
    ///
    /// If the set overflows `max_active`, the single oldest signal is evicted
    /// regardless of its remaining TTL. Eviction is capacity-driven and
    /// silent for the publishing admin; the evicted signal is returned so the
    /// caller can log it. Returns `(active_count, evicted)`.
    pub fn publish(&self, signal: Signal) -> (usize, Option<Signal>) {
        let mut inner = self.inner.lock();
        inner.active.push_back(signal);

        let evicted = if inner.active.len() > self.max_active {
            inner.active.pop_front()
        } else {
            None
        };

        (inner.active.len(), evicted)
    }

    /// Return every still-active signal this customer has not seen, marking
    /// each as delivered
    ///
    /// Expired signals are swept under the same lock before the scan, so a
    /// poll arriving between sweeper ticks never sees a stale signal. The
    /// seen-set update is atomic with the read: two concurrent polls from the
    /// same customer cannot double-deliver. Returns the delivered signals and
    /// the count of signals still active.
    pub fn poll_new(&self, customer_id: &str) -> (Vec<AnnotatedSignal>, usize) {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner);

        // Split borrow: the seen set is mutated while the active set is scanned
        let RegistryInner { active, delivered } = &mut *inner;
        let seen = delivered.entry(customer_id.to_string()).or_default();

        let mut fresh = Vec::new();
        for signal in active.iter() {
            if seen.insert(signal.signal_id.clone()) {
                fresh.push(AnnotatedSignal::at(signal, true, now));
            }
        }

        (fresh, active.len())
    }

    /// Report every still-active signal with an `is_new` annotation, without
    /// consuming delivery state
    pub fn poll_all(&self, customer_id: &str) -> (Vec<AnnotatedSignal>, usize) {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner);

        let seen = inner.delivered.get(customer_id);
        let signals: Vec<AnnotatedSignal> = inner
            .active
            .iter()
            .map(|signal| {
                let is_new = seen.map_or(true, |ids| !ids.contains(&signal.signal_id));
                AnnotatedSignal::at(signal, is_new, now)
            })
            .collect();

        let count = signals.len();
        (signals, count)
    }

    /// Remove one delivery record so the signal can be delivered again
    ///
    /// Support/testing operation; delivery records are otherwise never
    /// deleted.
    pub fn reset_delivery(&self, customer_id: &str, signal_id: &str) -> Result<(), RelayError> {
        let mut inner = self.inner.lock();
        let removed = inner
            .delivered
            .get_mut(customer_id)
            .map_or(false, |ids| ids.remove(signal_id));

        if removed {
            Ok(())
        } else {
            Err(RelayError::NotFound(format!(
                "no delivery record for customer {} and signal {}",
                customer_id, signal_id
            )))
        }
    }

    /// Evict expired signals; returns how many were removed
    ///
    /// Called by the background sweeper. Polls apply the same predicate under
    /// the same lock, so the two can never observe inconsistent state.
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner)
    }

    /// Current number of active (unexpired) signals
    pub fn active_count(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner);
        inner.active.len()
    }

    /// Snapshot of aggregate counters
    pub fn stats(&self) -> RegistryStats {
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner);

        let total_deliveries = inner.delivered.values().map(HashSet::len).sum();
        let recent_signals = inner
            .active
            .iter()
            .rev()
            .take(5)
            .rev()
            .cloned()
            .collect();

        RegistryStats {
            active_signals: inner.active.len(),
            customers_served: inner.delivered.len(),
            total_deliveries,
            recent_signals,
        }
    }

    fn sweep_locked(inner: &mut RegistryInner) -> usize {
        let now = Utc::now();
        let before = inner.active.len();
        inner.active.retain(|signal| !signal.is_expired(now));
        before - inner.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalSide;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn buy_signal(symbol: &str, ttl_minutes: i64) -> Signal {
        Signal::new(
            symbol.to_string(),
            SignalSide::Buy,
            dec!(1.1000),
            dec!(1.0950),
            dec!(1.1100),
            ttl_minutes,
            "ADMIN_001".to_string(),
        )
    }

    fn expired_signal(symbol: &str) -> Signal {
        let mut signal = buy_signal(symbol, 5);
        signal.expires_at = Utc::now() - Duration::seconds(1);
        signal
    }

    #[test]
    fn test_poll_new_delivers_once() {
        let registry = SignalRegistry::new(10);
        registry.publish(buy_signal("EURUSD", 5));

        let (first, active) = registry.poll_new("CUST_001");
        assert_eq!(first.len(), 1);
        assert_eq!(active, 1);
        assert!(first[0].is_new);

        // Idempotent exhaustion: nothing new on the second poll
        let (second, active) = registry.poll_new("CUST_001");
        assert!(second.is_empty());
        assert_eq!(active, 1);
    }

    #[test]
    fn test_each_customer_gets_each_signal_once() {
        let registry = SignalRegistry::new(10);
        registry.publish(buy_signal("EURUSD", 5));

        let (c1, _) = registry.poll_new("CUST_001");
        let (c2, _) = registry.poll_new("CUST_002");
        assert_eq!(c1.len(), 1);
        assert_eq!(c2.len(), 1);
        assert!(registry.poll_new("CUST_001").0.is_empty());
        assert!(registry.poll_new("CUST_002").0.is_empty());
    }

    #[test]
    fn test_later_signal_still_delivered() {
        let registry = SignalRegistry::new(10);
        registry.publish(buy_signal("EURUSD", 5));
        registry.poll_new("CUST_001");

        registry.publish(buy_signal("GBPUSD", 5));
        let (fresh, _) = registry.poll_new("CUST_001");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].signal.symbol, "GBPUSD");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let registry = SignalRegistry::new(3);
        let first = buy_signal("S0", 5);
        let first_id = first.signal_id.clone();
        registry.publish(first);
        registry.publish(buy_signal("S1", 5));
        registry.publish(buy_signal("S2", 5));

        let (count, evicted) = registry.publish(buy_signal("S3", 5));
        assert_eq!(count, 3);
        assert_eq!(evicted.unwrap().signal_id, first_id);

        let (signals, _) = registry.poll_new("CUST_001");
        let symbols: Vec<&str> = signals.iter().map(|s| s.signal.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["S1", "S2", "S3"]);
    }

    #[test]
    fn test_capacity_eviction_ignores_remaining_ttl() {
        // The oldest entry goes even though it has more TTL left than newer ones
        let registry = SignalRegistry::new(1);
        registry.publish(buy_signal("LONG_TTL", 60));
        let (count, evicted) = registry.publish(buy_signal("SHORT_TTL", 1));
        assert_eq!(count, 1);
        assert_eq!(evicted.unwrap().symbol, "LONG_TTL");
    }

    #[test]
    fn test_expired_signal_absent_from_polls() {
        let registry = SignalRegistry::new(10);
        registry.publish(expired_signal("EURUSD"));

        let (fresh, active) = registry.poll_new("CUST_001");
        assert!(fresh.is_empty());
        assert_eq!(active, 0);

        let (all, _) = registry.poll_all("CUST_001");
        assert!(all.is_empty());
    }

    #[test]
    fn test_poll_all_does_not_consume_delivery_state() {
        let registry = SignalRegistry::new(10);
        registry.publish(buy_signal("EURUSD", 5));

        let (all, _) = registry.poll_all("CUST_001");
        assert_eq!(all.len(), 1);
        assert!(all[0].is_new);

        // Still new: poll_all must not mark anything delivered
        let (fresh, _) = registry.poll_new("CUST_001");
        assert_eq!(fresh.len(), 1);

        let (all, _) = registry.poll_all("CUST_001");
        assert!(!all[0].is_new);
    }

    #[test]
    fn test_sweep_expired_counts_removals() {
        let registry = SignalRegistry::new(10);
        registry.publish(expired_signal("A"));
        registry.publish(expired_signal("B"));
        registry.publish(buy_signal("C", 5));

        assert_eq!(registry.sweep_expired(), 2);
        assert_eq!(registry.sweep_expired(), 0);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_reset_delivery_allows_redelivery() {
        let registry = SignalRegistry::new(10);
        registry.publish(buy_signal("EURUSD", 5));

        let (fresh, _) = registry.poll_new("CUST_001");
        let signal_id = fresh[0].signal.signal_id.clone();
        assert!(registry.poll_new("CUST_001").0.is_empty());

        registry.reset_delivery("CUST_001", &signal_id).unwrap();
        let (again, _) = registry.poll_new("CUST_001");
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].signal.signal_id, signal_id);
    }

    #[test]
    fn test_reset_delivery_unknown_pair() {
        let registry = SignalRegistry::new(10);
        let err = registry.reset_delivery("CUST_001", "SIG-0-0").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_stats_counts_deliveries() {
        let registry = SignalRegistry::new(10);
        registry.publish(buy_signal("EURUSD", 5));
        registry.publish(buy_signal("GBPUSD", 5));
        registry.poll_new("CUST_001");
        registry.poll_new("CUST_002");

        let stats = registry.stats();
        assert_eq!(stats.active_signals, 2);
        assert_eq!(stats.customers_served, 2);
        assert_eq!(stats.total_deliveries, 4);
        assert_eq!(stats.recent_signals.len(), 2);
    }

    #[test]
    fn test_concurrent_polls_same_customer_no_double_delivery() {
        let registry = Arc::new(SignalRegistry::new(10));
        registry.publish(buy_signal("EURUSD", 5));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.poll_new("CUST_001").0.len())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1);
    }
}
