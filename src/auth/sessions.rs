//! Session table with sliding expiration
//!
//! Tokens are minted on successful credential validation and let clients
//! skip the secret-key round-trip on subsequent requests. Expiry is checked
//! lazily on use and proactively by the background sweeper.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::models::{Role, Session};

/// Thread-safe token -> session mapping
pub struct SessionTable {
    sessions: Mutex<HashMap<String, Session>>,
    timeout: Duration,
}

impl SessionTable {
    pub fn new(timeout_minutes: i64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout: Duration::minutes(timeout_minutes),
        }
    }

    /// Mint a session for a freshly validated identity; returns the token
    pub fn create(&self, identity_id: &str, role: Role) -> String {
        let session = Session::new(identity_id.to_string(), role);
        let token = session.token.clone();
        self.sessions.lock().insert(token.clone(), session);
        token
    }

    /// Validate a token against the claimed identity and refresh its
    /// sliding-expiry clock
    ///
    /// The session must be unexpired and bound to exactly the claimed
    /// (id, role) pair. An expired session is removed on the spot.
    pub fn touch(&self, token: &str, claimed_id: &str, role: Role) -> bool {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();

        match sessions.get_mut(token) {
            Some(session) if session.is_expired(now, self.timeout) => {
                sessions.remove(token);
                false
            }
            Some(session) if session.identity_id == claimed_id && session.role == role => {
                session.touch(now);
                true
            }
            _ => false,
        }
    }

    /// Drop sessions idle past the timeout; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.timeout));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
