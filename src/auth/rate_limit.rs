//! Per-identity sliding-window rate limiting
//!
//! Each identity keeps a window of request timestamps pruned lazily on every
//! check. Admins get the larger ceiling since management operations come in
//! bursts; customers poll more often but do less per call. Only admitted
//! requests append a timestamp, so a rejected request never consumes a slot.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::Role;
use crate::registry::RelayError;

const WINDOW: Duration = Duration::from_secs(60);

/// Thread-safe sliding-window rate limiter
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    customer_limit: u32,
    admin_limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(customer_limit: u32, admin_limit: u32) -> Self {
        Self::with_window(customer_limit, admin_limit, WINDOW)
    }

    /// Custom window length, used by tests to avoid real 60-second waits
    pub fn with_window(customer_limit: u32, admin_limit: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            customer_limit,
            admin_limit,
            window,
        }
    }

    /// Ceiling that applies to a role
    pub fn limit_for(&self, role: Role) -> u32 {
        match role {
            Role::Admin => self.admin_limit,
            Role::Customer => self.customer_limit,
        }
    }

    /// Admit or reject one request for `identity_id`
    ///
    /// On rejection the window is left untouched: the rejected request does
    /// not count against the identity.
    pub fn check(&self, identity_id: &str, role: Role) -> Result<(), RelayError> {
        let limit = self.limit_for(role);
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(identity_id.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) > self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit as usize {
            return Err(RelayError::RateLimitExceeded { limit });
        }

        window.push_back(now);
        Ok(())
    }

    /// Number of identities with a non-empty window, for stats reporting
    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drop identities whose whole window has aged out
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| {
            window.retain(|&t| now.duration_since(t) <= self.window);
            !window.is_empty()
        });
        before - windows.len()
    }
}
