//! Wire request/response types
//!
//! One line-delimited JSON request per connection, one response back. The
//! request is a single flat object: which fields are required depends on the
//! `action`, so everything beyond `action` is optional at the decode layer
//! and checked by the handlers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AnnotatedSignal, IdentityStatus, Role, Signal, SignalSide};
use crate::registry::RelayError;

/// A decoded client request
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub action: String,
    pub role: Option<Role>,
    pub id: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,

    // send_signal payload
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub entry: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub tp: Option<Decimal>,
    pub ttl_minutes: Option<i64>,

    // credential management payload
    pub target_role: Option<Role>,
    pub target_id: Option<String>,
    pub new_secret: Option<String>,
    pub status: Option<IdentityStatus>,

    // reset_delivery payload
    pub customer_id: Option<String>,
    pub signal_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// One masked credential entry in a `list_api_keys` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskedKey {
    pub role: Role,
    pub id: String,
    pub secret_key: String,
    pub status: IdentityStatus,
}

/// A recently published signal in the stats payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentSignal {
    pub signal_id: String,
    pub symbol: String,
    pub side: SignalSide,
    pub age_seconds: i64,
    pub expires_in_seconds: i64,
    pub created_by: String,
}

/// Aggregate counters for `get_stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub uptime_seconds: u64,
    pub active_signals: usize,
    pub customers_served: usize,
    pub total_deliveries: usize,
    pub active_connections: usize,
    pub max_connections: usize,
    pub active_sessions: usize,
    pub rate_limited_identities: usize,
    pub recent_signals: Vec<RecentSignal>,
}

/// The single response shape sent for every request, success or error
///
/// Unused fields are omitted from the JSON. `session_id` is echoed whenever a
/// session is in play so the client can reuse it without resending its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<Vec<AnnotatedSignal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_active_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SystemStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<MaskedKey>>,
}

impl Response {
    pub fn success() -> Self {
        Self {
            status: ResponseStatus::Success,
            code: None,
            message: None,
            session_id: None,
            signal: None,
            signals: None,
            total_active_count: None,
            stats: None,
            keys: None,
        }
    }

    pub fn error(err: &RelayError) -> Self {
        Self {
            status: ResponseStatus::Error,
            code: Some(err.code().to_string()),
            message: Some(err.client_message()),
            ..Self::success()
        }
    }

    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session_id = Some(token.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_signals(mut self, signals: Vec<AnnotatedSignal>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn with_active_count(mut self, count: usize) -> Self {
        self.total_active_count = Some(count);
        self
    }

    pub fn with_stats(mut self, stats: SystemStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_keys(mut self, keys: Vec<MaskedKey>) -> Self {
        self.keys = Some(keys);
        self
    }
}
