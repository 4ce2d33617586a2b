pub mod dispatcher;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use crate::auth::{AuthGate, CredentialStore, RateLimiter, SessionTable};
use crate::config::ServerConfig;
use crate::persistence::AuditStore;
use crate::registry::SignalRegistry;

pub use dispatcher::{ConnectionTracker, Dispatcher};

/// Shared state injected into the dispatcher and handlers at construction
///
/// Each component owns its own lock; no handler holds more than one at a
/// time.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: SignalRegistry,
    pub credentials: Arc<CredentialStore>,
    pub sessions: Arc<SessionTable>,
    pub rate_limiter: Arc<RateLimiter>,
    pub gate: AuthGate,
    pub connections: Arc<ConnectionTracker>,
    pub audit: Option<Arc<dyn AuditStore>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        credentials: Arc<CredentialStore>,
        audit: Option<Arc<dyn AuditStore>>,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionTable::new(config.session_timeout_minutes));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.customer_rate_limit,
            config.admin_rate_limit,
        ));
        let gate = AuthGate::new(
            Arc::clone(&credentials),
            Arc::clone(&sessions),
            Arc::clone(&rate_limiter),
        );
        let connections = Arc::new(ConnectionTracker::new(config.max_connections));

        Arc::new(Self {
            registry: SignalRegistry::new(config.max_active_signals),
            config,
            credentials,
            sessions,
            rate_limiter,
            gate,
            connections,
            audit,
            started_at: Instant::now(),
        })
    }

    /// Seconds since the server started
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
