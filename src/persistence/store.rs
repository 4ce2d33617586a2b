//! Audit persistence seam
//!
//! Optional write-through of signal creation, delivery marks and admin
//! activity for audit. The core is correct purely in memory: handlers call
//! the store after releasing the registry lock, log failures and carry on.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::{Signal, SignalSide};

/// External durable store consumed by the request handlers
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_signal(&self, signal: &Signal) -> io::Result<()>;
    async fn record_delivery(&self, customer_id: &str, signal_id: &str) -> io::Result<()>;
    async fn record_activity(&self, actor_id: &str, action: &str, details: &str)
        -> io::Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AuditEvent<'a> {
    SignalCreated {
        at: DateTime<Utc>,
        signal_id: &'a str,
        symbol: &'a str,
        side: SignalSide,
        created_by: &'a str,
        expires_at: DateTime<Utc>,
    },
    SignalDelivered {
        at: DateTime<Utc>,
        customer_id: &'a str,
        signal_id: &'a str,
    },
    AdminActivity {
        at: DateTime<Utc>,
        actor_id: &'a str,
        action: &'a str,
        details: &'a str,
    },
}

/// Append-only JSONL audit log on the local filesystem
pub struct JsonlAuditStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditStore {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, event: &AuditEvent<'_>) -> io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn record_signal(&self, signal: &Signal) -> io::Result<()> {
        self.append(&AuditEvent::SignalCreated {
            at: Utc::now(),
            signal_id: &signal.signal_id,
            symbol: &signal.symbol,
            side: signal.side,
            created_by: &signal.created_by,
            expires_at: signal.expires_at,
        })
        .await
    }

    async fn record_delivery(&self, customer_id: &str, signal_id: &str) -> io::Result<()> {
        self.append(&AuditEvent::SignalDelivered {
            at: Utc::now(),
            customer_id,
            signal_id,
        })
        .await
    }

    async fn record_activity(
        &self,
        actor_id: &str,
        action: &str,
        details: &str,
    ) -> io::Result<()> {
        self.append(&AuditEvent::AdminActivity {
            at: Utc::now(),
            actor_id,
            action,
            details,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn sample_signal() -> Signal {
        Signal::new(
            "EURUSD".to_string(),
            SignalSide::Buy,
            dec!(1.1000),
            dec!(1.0950),
            dec!(1.1100),
            5,
            "ADMIN_001".to_string(),
        )
    }

    #[tokio::test]
    async fn test_events_append_as_jsonl() {
        let dir = TempDir::new().unwrap();
        let store = JsonlAuditStore::open(dir.path().join("audit.jsonl"))
            .await
            .unwrap();

        let signal = sample_signal();
        store.record_signal(&signal).await.unwrap();
        store
            .record_delivery("CUST_001", &signal.signal_id)
            .await
            .unwrap();
        store
            .record_activity("ADMIN_001", "send_signal", "EURUSD buy at 1.1000")
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "signal_created");
        assert_eq!(first["symbol"], "EURUSD");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "signal_delivered");
        assert_eq!(second["customer_id"], "CUST_001");
    }

    #[tokio::test]
    async fn test_reopen_appends_rather_than_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let store = JsonlAuditStore::open(&path).await.unwrap();
        store.record_signal(&sample_signal()).await.unwrap();
        drop(store);

        let store = JsonlAuditStore::open(&path).await.unwrap();
        store.record_signal(&sample_signal()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
