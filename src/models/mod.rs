pub mod identity;
pub mod session;
pub mod signal;

pub use identity::{IdentityStatus, Role};
pub use session::Session;
pub use signal::{AnnotatedSignal, Signal, SignalSide};
