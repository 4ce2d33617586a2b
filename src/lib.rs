// Library Crate Root
// lib.rs

pub mod auth;
pub mod config;
pub mod jobs;
pub mod models;
pub mod persistence;
pub mod protocol;
pub mod registry;
pub mod server;

// pub use = re-export at crate root
pub use auth::{AuthGate, CredentialStore, RateLimiter, SessionTable};
pub use config::ServerConfig;
pub use models::{Role, Signal, SignalSide};
pub use persistence::{AuditStore, JsonlAuditStore};
pub use registry::{RelayError, SignalRegistry};
pub use server::{AppState, Dispatcher};
