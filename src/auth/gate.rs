//! Authentication gate
//!
//! Composes the credential store, session table and rate limiter into a
//! single admit/reject decision applied to every inbound request. The
//! session-token fast path exists so a polling customer does not resend its
//! secret key on every call.

use std::sync::Arc;

use crate::models::Role;
use crate::registry::RelayError;

use super::credentials::CredentialStore;
use super::rate_limit::RateLimiter;
use super::sessions::SessionTable;

/// Outcome of a successful gate check
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity_id: String,
    pub role: Role,
    /// Token the client should reuse on its next request
    pub session_token: String,
    /// True if this request minted a fresh session
    pub session_created: bool,
}

/// A rejected request
///
/// `session_token` is present when authentication succeeded before the
/// rejection (a rate-limited request), so the error response can still echo
/// the session for reuse.
#[derive(Debug)]
pub struct Rejection {
    pub error: RelayError,
    pub session_token: Option<String>,
}

pub struct AuthGate {
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionTable>,
    rate_limiter: Arc<RateLimiter>,
}

impl AuthGate {
    pub fn new(
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionTable>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            rate_limiter,
        }
    }

    /// Admit or reject one request
    ///
    /// 1. A valid session token bound to the claimed identity admits and
    ///    refreshes the session.
    /// 2. Otherwise a correct `(role, id, secret_key)` triple admits and
    ///    mints a new session.
    /// 3. Otherwise the request is rejected with a generic authentication
    ///    error that does not reveal which part was wrong.
    ///
    /// The rate-limit window is checked only after authentication succeeds,
    /// so neither auth failures nor rate-limited requests consume a slot.
    pub fn admit(
        &self,
        role: Role,
        id: &str,
        secret_key: Option<&str>,
        session_token: Option<&str>,
    ) -> Result<Admission, Rejection> {
        let (token, created) = self
            .authenticate(role, id, secret_key, session_token)
            .map_err(|error| Rejection {
                error,
                session_token: None,
            })?;
        if let Err(error) = self.rate_limiter.check(id, role) {
            return Err(Rejection {
                error,
                session_token: Some(token),
            });
        }

        Ok(Admission {
            identity_id: id.to_string(),
            role,
            session_token: token,
            session_created: created,
        })
    }

    fn authenticate(
        &self,
        role: Role,
        id: &str,
        secret_key: Option<&str>,
        session_token: Option<&str>,
    ) -> Result<(String, bool), RelayError> {
        if let Some(token) = session_token {
            if self.sessions.touch(token, id, role) {
                return Ok((token.to_string(), false));
            }
            // An invalid or expired token falls through to the credential
            // path rather than failing outright
        }

        match secret_key {
            Some(secret) if self.credentials.validate(role, id, secret) => {
                let token = self.sessions.create(id, role);
                tracing::info!("🔑 {} {} authenticated, session {}…", role, id, &token[..8]);
                Ok((token, true))
            }
            _ => Err(RelayError::AuthenticationFailed),
        }
    }
}
