pub mod store;

pub use store::{AuditStore, JsonlAuditStore};
