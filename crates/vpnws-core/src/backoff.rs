//! Reconnect wait policy.
//!
//! The driver sleeps for the current wait before every reopen attempt.  The
//! wait starts at the floor, doubles after each failed attempt, caps at the
//! ceiling, and snaps back to the floor on the first successful open.  With
//! the default 1 s floor and 60 s ceiling the waits run
//! 1, 2, 4, 8, 16, 32, 60, 60, …

use std::time::Duration;

/// Default shortest reconnect wait.
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Default longest reconnect wait.
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Exponential backoff state for session reopening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    next: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl ReconnectBackoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            next: floor,
            floor,
            ceiling,
        }
    }

    /// Returns the wait to sleep before the next attempt and doubles the
    /// stored wait, capped at the ceiling.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.next;
        self.next = (self.next * 2).min(self.ceiling);
        wait
    }

    /// Snaps back to the floor.  Called after a successful open.
    pub fn reset(&mut self) {
        self.next = self.floor;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_CEILING)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
