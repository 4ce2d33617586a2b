//! Error types for the signal relay
//!
//! This module centralizes all error types used by the relay, making error
//! handling consistent across the authentication gate, the registry and the
//! request dispatcher. Every variant maps to a stable machine-readable wire
//! code via [`RelayError::code`].

use thiserror::Error;

/// Errors that can occur while admitting or handling a request
///
/// # Error Categories
///
/// - **Gate errors**: `AuthenticationFailed`, `RateLimitExceeded`
/// - **Validation errors**: `ValidationFailed`, `MalformedRequest`
/// - **State errors**: `NotFound`, `AlreadyExists`
/// - **Internal errors**: `Storage`, `Internal` (detail is logged server-side
///   only, never sent to the client)
#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad credentials or session. Deliberately carries no detail about
    /// which part of the triple was wrong.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The identity exceeded its sliding-window request ceiling
    #[error("rate limit exceeded: maximum {limit} requests per minute")]
    RateLimitExceeded { limit: u32 },

    /// Signal field validation failed (missing fields, bad side, price ordering)
    #[error("invalid signal: {0}")]
    ValidationFailed(String),

    /// Operation referenced an unknown identity or delivery record
    #[error("not found: {0}")]
    NotFound(String),

    /// An identity with the same id already exists under that role
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The payload did not decode as a request
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Connection ceiling reached, request rejected before dispatch
    #[error("server busy, too many connections")]
    TooManyConnections,

    /// Durable credential write failed
    #[error("credential storage error")]
    Storage(#[from] std::io::Error),

    /// Unexpected internal fault. Display stays generic; the detail string
    /// is for server-side logs.
    #[error("internal server error")]
    Internal(String),
}

impl RelayError {
    /// Stable machine-readable code included in error responses
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::AuthenticationFailed => "auth_failed",
            RelayError::RateLimitExceeded { .. } => "rate_limited",
            RelayError::ValidationFailed(_) => "validation_failed",
            RelayError::NotFound(_) => "not_found",
            RelayError::AlreadyExists(_) => "already_exists",
            RelayError::MalformedRequest(_) => "malformed_request",
            RelayError::TooManyConnections => "too_many_connections",
            RelayError::Storage(_) | RelayError::Internal(_) => "server_error",
        }
    }

    /// Message safe to send to the client
    ///
    /// Internal faults collapse to a generic message; everything else uses
    /// the Display form.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Storage(_) | RelayError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

}
