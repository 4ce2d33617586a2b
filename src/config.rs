//! Server configuration
//!
//! Read from environment variables (via `.env` in development) with working
//! defaults, the same layering the operational scripts expect.

use std::path::PathBuf;

/// Runtime configuration for the relay
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    /// Requests per minute per customer identity
    pub customer_rate_limit: u32,
    /// Requests per minute per admin identity; larger because management
    /// operations come in bursts
    pub admin_rate_limit: u32,
    pub session_timeout_minutes: i64,
    /// Default TTL applied when a `send_signal` request carries none
    pub default_ttl_minutes: i64,
    pub max_active_signals: usize,
    pub sweep_interval_secs: u64,
    /// A connection that has not sent a full request within this window is
    /// disconnected
    pub read_timeout_secs: u64,
    pub credentials_path: PathBuf,
    /// Audit log path; `None` runs the core in-memory only
    pub audit_log_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("RELAY_HOST", "0.0.0.0".to_string()),
            port: env_parse("RELAY_PORT", 7878),
            max_connections: env_parse("RELAY_MAX_CONNECTIONS", 100),
            customer_rate_limit: env_parse("RELAY_CUSTOMER_RATE_LIMIT", 60),
            admin_rate_limit: env_parse("RELAY_ADMIN_RATE_LIMIT", 120),
            session_timeout_minutes: env_parse("RELAY_SESSION_TIMEOUT_MINUTES", 30),
            default_ttl_minutes: env_parse("RELAY_SIGNAL_TTL_MINUTES", 5),
            max_active_signals: env_parse("RELAY_MAX_ACTIVE_SIGNALS", 10),
            sweep_interval_secs: env_parse("RELAY_SWEEP_INTERVAL_SECS", 60),
            read_timeout_secs: env_parse("RELAY_READ_TIMEOUT_SECS", 10),
            credentials_path: PathBuf::from(env_or(
                "RELAY_CREDENTIALS_PATH",
                "api_keys.json".to_string(),
            )),
            audit_log_path: std::env::var("RELAY_AUDIT_LOG_PATH").ok().map(PathBuf::from),
        }
    }

    /// Listen address in `host:port` form
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            max_connections: 100,
            customer_rate_limit: 60,
            admin_rate_limit: 120,
            session_timeout_minutes: 30,
            default_ttl_minutes: 5,
            max_active_signals: 10,
            sweep_interval_secs: 60,
            read_timeout_secs: 10,
            credentials_path: PathBuf::from("api_keys.json"),
            audit_log_path: None,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 7878);
        assert_eq!(config.customer_rate_limit, 60);
        assert!(config.admin_rate_limit > config.customer_rate_limit);
        assert_eq!(config.max_active_signals, 10);
        assert!(config.audit_log_path.is_none());
    }

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:7878");
    }
}
