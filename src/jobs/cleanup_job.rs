use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::server::AppState;

/// Expiry sweep job
///
/// Runs on a fixed interval to evict expired signals, drop idle sessions and
/// release empty rate-limit windows. Expiry is also enforced lazily at poll
/// time, so this job only bounds how long dead entries linger in memory.
pub struct CleanupJob {
    state: Arc<AppState>,
    interval: Duration,
}

impl CleanupJob {
    pub fn new(state: Arc<AppState>) -> Self {
        let interval = Duration::from_secs(state.config.sweep_interval_secs);
        Self { state, interval }
    }

    /// Perform one sweep across all expirable state
    fn sweep(&self) {
        let expired_signals = self.state.registry.sweep_expired();
        if expired_signals > 0 {
            tracing::info!("🧹 sweep removed {} expired signal(s)", expired_signals);
        }

        let expired_sessions = self.state.sessions.sweep_expired();
        if expired_sessions > 0 {
            tracing::info!("🧹 sweep removed {} expired session(s)", expired_sessions);
        }

        let idle_windows = self.state.rate_limiter.sweep_idle();
        if idle_windows > 0 {
            tracing::debug!("🧹 sweep released {} idle rate-limit window(s)", idle_windows);
        }
    }

    /// Register this job with the scheduler
    pub async fn register(
        self,
        scheduler: &JobScheduler,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let interval = self.interval;
        let job = Arc::new(self);

        let scheduled = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let job = Arc::clone(&job);
            Box::pin(async move {
                job.sweep();
            })
        })?;

        scheduler.add(scheduled).await?;

        tracing::info!("🧹 cleanup job registered (runs every {:?})", interval);

        Ok(())
    }

    /// Run a sweep immediately (manual trigger)
    pub fn run_now(&self) {
        self.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;
    use crate::config::ServerConfig;
    use crate::models::{Signal, SignalSide};
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn expired_signal(id: &str) -> Signal {
        let now = Utc::now();
        Signal {
            signal_id: id.to_string(),
            symbol: "EURUSD".to_string(),
            side: SignalSide::Buy,
            entry_price: dec!(1.1000),
            stop_loss: dec!(1.0950),
            take_profit: dec!(1.1100),
            created_at: now - ChronoDuration::minutes(10),
            expires_at: now - ChronoDuration::minutes(5),
            created_by: "ADMIN_001".to_string(),
        }
    }

    #[test]
    fn test_sweep_clears_expired_signals() {
        let dir = TempDir::new().unwrap();
        let credentials =
            Arc::new(CredentialStore::load(dir.path().join("api_keys.json")).unwrap());
        let state = AppState::new(ServerConfig::default(), credentials, None);

        state.registry.publish(expired_signal("SIG-A"));
        state.registry.publish(expired_signal("SIG-B"));
        assert_eq!(state.registry.active_count(), 2);

        let job = CleanupJob::new(Arc::clone(&state));
        job.run_now();
        assert_eq!(state.registry.active_count(), 0);

        // Idempotent on an already-clean registry
        job.run_now();
        assert_eq!(state.registry.active_count(), 0);
    }
}
