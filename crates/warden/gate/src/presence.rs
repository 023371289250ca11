use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

/// External "a human is online" signal.
pub trait HumanPresence: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Heartbeat-driven presence: online while the last heartbeat is younger
/// than the TTL.
#[derive(Debug)]
pub struct PresenceSignal {
    ttl: Duration,
    last_seen: Mutex<Option<Instant>>,
}

impl PresenceSignal {
    /// Starts offline.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_seen: Mutex::new(None),
        }
    }

    pub fn mark_online(&self, operator_id: &str) {
        info!(operator = operator_id, "human presence marked online");
        self.heartbeat();
    }

    pub fn mark_offline(&self, operator_id: &str) {
        info!(operator = operator_id, "human presence marked offline");
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn heartbeat(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl HumanPresence for PresenceSignal {
    fn is_online(&self) -> bool {
        let last_seen = *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        last_seen.is_some_and(|at| at.elapsed() < self.ttl)
    }
}
