//! Pure timing rules for the coordinator.
//!
//! Both types take the current instant as an argument instead of reading a
//! clock, so they can be exercised without a runtime.

use std::time::Duration;

use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Minimum interval
// ---------------------------------------------------------------------------

/// Enforces a minimum spacing between refresh starts.
#[derive(Debug, Clone)]
pub struct MinIntervalGuard {
    min_interval: Duration,
    last_start: Option<Instant>,
}

impl MinIntervalGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: None,
        }
    }

    /// Record a start at `now` if allowed. Returns `false` when the previous
    /// start was less than `min_interval` ago; the attempt is then dropped.
    pub fn try_start(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_start {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_start = Some(now);
        true
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.last_start
    }
}

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

/// What a debounced trigger should do at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounce {
    /// Nothing was triggered.
    Idle,
    /// Triggered, but the window is still open until this instant.
    Wait(Instant),
    /// The window has closed; run once now.
    Fire,
}

/// Trailing-edge debouncer: a burst of triggers fires once, `window` after
/// the last trigger of the burst.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Register a trigger at `now`, pushing the deadline out. Returns the new
    /// deadline.
    pub fn trigger(&mut self, now: Instant) -> Instant {
        let deadline = now + self.window;
        self.deadline = Some(deadline);
        deadline
    }

    /// Check the state at `now`. `Fire` clears the pending trigger.
    pub fn check(&mut self, now: Instant) -> Debounce {
        match self.deadline {
            None => Debounce::Idle,
            Some(deadline) if now < deadline => Debounce::Wait(deadline),
            Some(_) => {
                self.deadline = None;
                Debounce::Fire
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
