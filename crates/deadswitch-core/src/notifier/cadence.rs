use chrono::Duration;

use crate::clock::{after, Timestamp};

/// Repeating schedule: escalation sends and check-in reminders.
///
/// Holds only the next due instant; firing late never produces a burst of
/// catch-up sends.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    next_due: Option<Timestamp>,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Start the cadence; the first repeat is one interval after `now`.
    pub fn arm(&mut self, now: Timestamp) {
        self.next_due = Some(after(now, self.interval));
    }

    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Timestamp> {
        self.next_due
    }

    /// Consume one firing if due, rescheduling from `now`.
    pub fn take_due(&mut self, now: Timestamp) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(after(now, self.interval));
                true
            }
            _ => false,
        }
    }
}
