/// Scheduled background tasks
///
/// Contains jobs that run on a fixed interval:
/// - Expiry sweep over signals, sessions and rate-limit windows

pub mod cleanup_job;

pub use cleanup_job::CleanupJob;
