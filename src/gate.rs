//! Alert cooldown gate.
//!
//! Two states: Armed and Cooldown. A granted alert moves the gate to
//! Cooldown; it re-arms by itself once the cooldown has fully elapsed. The
//! elapsed check runs on every query rather than on a timer, so re-arming
//! costs nothing and alert latency is bounded by one detection-loop cycle,
//! not guaranteed exact against the clock.
//!
//! Callers only consult the gate on positive detection events; the gate
//! itself knows nothing about frames or detections.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct AlertGate {
    cooldown: Duration,
    last_alert: Mutex<Option<Instant>>,
}

impl AlertGate {
    /// A fresh gate starts Armed: the first qualifying event always grants.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: Mutex::new(None),
        }
    }

    /// Decide whether an event observed at `now` may escalate into an alert.
    ///
    /// Grants while Armed and records `now` as the new cooldown origin in
    /// the same critical section, so concurrent callers in the same window
    /// get exactly one grant. An event landing exactly on the cooldown
    /// boundary is denied; the cooldown must have strictly elapsed.
    pub fn try_grant(&self, now: Instant) -> bool {
        let mut last = self.lock();
        let armed = match *last {
            None => true,
            Some(previous) => now.duration_since(previous) > self.cooldown,
        };
        if armed {
            *last = Some(now);
        }
        armed
    }

    /// Instant of the most recent granted alert.
    pub fn last_alert(&self) -> Option<Instant> {
        *self.lock()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        // Only ever holds a plain Option<Instant>; a poisoned lock still
        // guards a coherent value.
        self.last_alert
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
