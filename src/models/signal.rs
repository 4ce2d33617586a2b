use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single trade recommendation distributed to customers
///
/// Signals are immutable once created; their lifecycle status (active vs
/// expired) is derived from `expires_at` rather than stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub symbol: String,
    pub side: SignalSide,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by: String,
}

/// Signal side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSide {
    Buy,
    Sell,
}

impl Signal {
    /// Create a new signal with a fresh globally-unique id
    pub fn new(
        symbol: String,
        side: SignalSide,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        ttl_minutes: i64,
        created_by: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            signal_id: generate_signal_id(now),
            symbol,
            side,
            entry_price,
            stop_loss,
            take_profit,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            created_by,
        }
    }

    /// Check whether the signal has passed its expiry time
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds since the signal was created (clamped at zero)
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }

    /// Seconds until expiry (clamped at zero once expired)
    pub fn expires_in_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// A signal as returned to a polling customer, annotated with delivery context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedSignal {
    #[serde(flatten)]
    pub signal: Signal,
    /// True if this customer has not received the signal before
    pub is_new: bool,
    pub age_seconds: i64,
    pub expires_in_seconds: i64,
}

impl AnnotatedSignal {
    pub fn at(signal: &Signal, is_new: bool, now: DateTime<Utc>) -> Self {
        Self {
            is_new,
            age_seconds: signal.age_seconds(now),
            expires_in_seconds: signal.expires_in_seconds(now),
            signal: signal.clone(),
        }
    }
}

/// Monotonic-time-based id plus a random disambiguator
///
/// Uniqueness is the only hard requirement; the timestamp prefix keeps ids
/// readable in logs and the audit trail.
fn generate_signal_id(now: DateTime<Utc>) -> String {
    format!("SIG-{}-{:04X}", now.timestamp_millis(), rand::random::<u16>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_signal(ttl_minutes: i64) -> Signal {
        Signal::new(
            "EURUSD".to_string(),
            SignalSide::Buy,
            dec!(1.1000),
            dec!(1.0950),
            dec!(1.1100),
            ttl_minutes,
            "ADMIN_001".to_string(),
        )
    }

    #[test]
    fn test_signal_not_expired_within_ttl() {
        let signal = sample_signal(5);
        assert!(!signal.is_expired(Utc::now()));
        assert!(signal.expires_in_seconds(Utc::now()) > 0);
    }

    #[test]
    fn test_signal_expired_after_ttl() {
        let signal = sample_signal(5);
        let later = signal.created_at + Duration::minutes(6);
        assert!(signal.is_expired(later));
        assert_eq!(signal.expires_in_seconds(later), 0);
    }

    #[test]
    fn test_signal_ids_unique() {
        let mut ids: Vec<String> = (0..100)
            .map(|_| sample_signal(5).signal_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_annotated_signal_flattens_fields() {
        let signal = sample_signal(5);
        let annotated = AnnotatedSignal::at(&signal, true, Utc::now());
        let json = serde_json::to_value(&annotated).unwrap();
        assert_eq!(json["symbol"], "EURUSD");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["is_new"], true);
    }
}
