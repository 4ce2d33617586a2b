pub mod messages;

pub use messages::{
    MaskedKey, RecentSignal, Request, Response, ResponseStatus, SystemStats,
};
