use chrono::{DateTime, Duration, Utc};

use super::identity::Role;

/// An authenticated context substituting for resending the secret key
///
/// Sessions use sliding expiration: every validated request refreshes
/// `last_activity`, and a session dies once it has been idle longer than the
/// configured timeout.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub identity_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(identity_id: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            identity_id,
            role,
            created_at: now,
            last_activity: now,
        }
    }

    /// True if the session has been idle longer than `timeout`
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }

    /// Refresh the sliding-expiry clock
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fresh_not_expired() {
        let session = Session::new("CUST_001".to_string(), Role::Customer);
        assert!(!session.is_expired(Utc::now(), Duration::minutes(30)));
    }

    #[test]
    fn test_session_expires_after_idle_timeout() {
        let session = Session::new("CUST_001".to_string(), Role::Customer);
        let later = session.last_activity + Duration::minutes(31);
        assert!(session.is_expired(later, Duration::minutes(30)));
    }

    #[test]
    fn test_touch_extends_session() {
        let mut session = Session::new("ADMIN_001".to_string(), Role::Admin);
        let later = session.last_activity + Duration::minutes(29);
        session.touch(later);
        assert!(!session.is_expired(later + Duration::minutes(29), Duration::minutes(30)));
    }

    #[test]
    fn test_tokens_unique() {
        let a = Session::new("CUST_001".to_string(), Role::Customer);
        let b = Session::new("CUST_001".to_string(), Role::Customer);
        assert_ne!(a.token, b.token);
    }
}
