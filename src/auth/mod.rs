pub mod credentials;
pub mod gate;
pub mod rate_limit;
pub mod sessions;

pub use credentials::CredentialStore;
pub use gate::{Admission, AuthGate, Rejection};
pub use rate_limit::RateLimiter;
pub use sessions::SessionTable;
