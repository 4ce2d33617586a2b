pub mod errors;
pub mod signals;
pub mod validation;

pub use errors::RelayError;
pub use signals::{RegistryStats, SignalRegistry};
pub use validation::ValidSignalPayload;
