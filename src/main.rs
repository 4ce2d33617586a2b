use std::sync::Arc;

use signal_relay::jobs::CleanupJob;
use signal_relay::persistence::{AuditStore, JsonlAuditStore};
use signal_relay::{AppState, CredentialStore, Dispatcher, ServerConfig};
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // Load the credential table; a missing file starts the server empty
    let credentials = match CredentialStore::load(&config.credentials_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                "❌ Failed to load credentials from {}: {}",
                config.credentials_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    // Audit log is optional; the relay is fully functional without it
    let audit = initialize_audit_store(&config).await;

    let state = AppState::new(config, credentials, audit);

    initialize_cron_scheduler(Arc::clone(&state)).await;

    let addr = state.config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("❌ Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Signal relay listening on {}", addr);
    tracing::info!(
        "   Connections: {} max | rate limits: {}/min customer, {}/min admin",
        state.config.max_connections,
        state.config.customer_rate_limit,
        state.config.admin_rate_limit
    );
    tracing::info!(
        "   Signals: {} max active, {} min default TTL | sessions: {} min timeout",
        state.config.max_active_signals,
        state.config.default_ttl_minutes,
        state.config.session_timeout_minutes
    );
    tracing::info!("");
    tracing::info!("📡 Request examples (one JSON line per connection):");
    tracing::info!(
        r#"   {{"role":"admin","id":"ADMIN_001","secret_key":"...","action":"send_signal","symbol":"EURUSD","side":"buy","entry":1.1000,"sl":1.0950,"tp":1.1100}}"#
    );
    tracing::info!(
        r#"   {{"role":"customer","id":"CUST_001","secret_key":"...","action":"check_signal"}}"#
    );
    tracing::info!("");

    let dispatcher = Dispatcher::new(state);
    if let Err(e) = dispatcher.run(listener).await {
        tracing::error!("❌ Accept loop failed: {}", e);
        std::process::exit(1);
    }
}

/// Open the JSONL audit store if an audit path is configured
async fn initialize_audit_store(config: &ServerConfig) -> Option<Arc<dyn AuditStore>> {
    let path = config.audit_log_path.as_ref()?;

    match JsonlAuditStore::open(path).await {
        Ok(store) => {
            tracing::info!("🗄️  Audit log: {}", path.display());
            Some(Arc::new(store) as Arc<dyn AuditStore>)
        }
        Err(e) => {
            tracing::warn!("⚠️  Audit log disabled, failed to open {}: {}", path.display(), e);
            None
        }
    }
}

/// Initialize the cron scheduler for the periodic expiry sweep
async fn initialize_cron_scheduler(state: Arc<AppState>) {
    let scheduler = match JobScheduler::new().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("❌ Failed to create cron scheduler: {}", e);
            tracing::warn!("⚠️  Expiry will only be enforced lazily at poll time");
            return;
        }
    };

    let cleanup_job = CleanupJob::new(state);
    if let Err(e) = cleanup_job.register(&scheduler).await {
        tracing::error!("❌ Failed to register cleanup job: {}", e);
        return;
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!("❌ Failed to start cron scheduler: {}", e);
        return;
    }

    // Keep scheduler alive (it will run in the background)
    std::mem::forget(scheduler);
}
