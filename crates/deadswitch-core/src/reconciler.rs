//! Foreground reconciliation.
//!
//! When the host comes back from suspension, deadlines may have passed while
//! nothing was ticking. The reconciler compares the armed deadline against
//! the wall clock and fast-forwards the machine before regular ticking
//! resumes. It acts once per suspended-to-active transition; a second
//! `resume` without a `suspend` in between is ignored.

use tracing::debug;

use crate::clock::Timestamp;
use crate::events::Event;
use crate::switch::{Phase, SwitchMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Active,
    Suspended { since: Timestamp },
}

/// Outcome of one resume.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The deadline passed while suspended; `tick` ran.
    Expired(Option<Event>),
    /// Still time left; the countdown continues from here.
    Countdown { phase: Phase, remaining_secs: u64 },
    /// No live deadline.
    Idle,
}

#[derive(Debug, Clone)]
pub struct ForegroundReconciler {
    state: HostState,
    resumes: u64,
}

impl Default for ForegroundReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundReconciler {
    pub fn new() -> Self {
        Self {
            state: HostState::Active,
            resumes: 0,
        }
    }

    /// Start out suspended, e.g. for a process that was not running.
    pub fn suspended_since(since: Timestamp) -> Self {
        Self {
            state: HostState::Suspended { since },
            resumes: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == HostState::Active
    }

    pub fn resumes(&self) -> u64 {
        self.resumes
    }

    pub fn suspend(&mut self, now: Timestamp) {
        if self.is_active() {
            self.state = HostState::Suspended { since: now };
        }
    }

    /// Reconcile after suspension. `None` when the host was already active.
    pub fn resume(&mut self, machine: &mut SwitchMachine, now: Timestamp) -> Option<Reconciliation> {
        let HostState::Suspended { since } = self.state else {
            return None;
        };
        self.state = HostState::Active;
        self.resumes += 1;
        debug!(suspended_secs = (now - since).num_seconds(), "host resumed");

        let outcome = match machine.armed() {
            Some(armed) if armed.phase == machine.phase() => {
                if armed.is_expired(now) {
                    Reconciliation::Expired(machine.tick(now))
                } else {
                    Reconciliation::Countdown {
                        phase: armed.phase,
                        remaining_secs: armed.remaining_secs(now),
                    }
                }
            }
            _ => Reconciliation::Idle,
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ContactRef;
    use crate::clock::Clock;
    use crate::memory::{ManualClock, MemoryAlarm, MemoryIncidents, RecordingSender};
    use crate::switch::{Collaborators, SwitchSettings};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn monitoring_machine(clock: &ManualClock) -> SwitchMachine {
        let mut m = SwitchMachine::new(
            Uuid::new_v4(),
            SwitchSettings::default(),
            Collaborators {
                clock: Arc::new(clock.clone()),
                sender: Box::new(RecordingSender::new()),
                incidents: Box::new(MemoryIncidents::new()),
                alarm: Box::new(MemoryAlarm::new()),
            },
        );
        m.add_contact(ContactRef::new("alice"));
        m.on_contact_reachable();
        m
    }

    #[test]
    fn resume_before_deadline_reports_countdown() {
        let clock = ManualClock::new(Utc::now());
        let mut m = monitoring_machine(&clock);
        let mut r = ForegroundReconciler::new();

        r.suspend(clock.now());
        let now = clock.advance(Duration::seconds(2));
        assert_eq!(
            r.resume(&mut m, now),
            Some(Reconciliation::Countdown {
                phase: Phase::Monitoring,
                remaining_secs: 3
            })
        );
    }

    #[test]
    fn resume_after_deadline_ticks_once() {
        let clock = ManualClock::new(Utc::now());
        let mut m = monitoring_machine(&clock);
        let mut r = ForegroundReconciler::new();

        r.suspend(clock.now());
        let now = clock.advance(Duration::seconds(9));
        let outcome = r.resume(&mut m, now).unwrap();
        assert!(matches!(
            outcome,
            Reconciliation::Expired(Some(Event::EscalationStarted { .. }))
        ));
        assert_eq!(m.phase(), Phase::Escalating);

        // second resume without suspend does nothing
        assert!(r.resume(&mut m, now).is_none());
        assert_eq!(r.resumes(), 1);
    }

    #[test]
    fn resume_without_deadline_is_idle() {
        let clock = ManualClock::new(Utc::now());
        let mut m = SwitchMachine::new(
            Uuid::new_v4(),
            SwitchSettings::default(),
            Collaborators {
                clock: Arc::new(clock.clone()),
                sender: Box::new(RecordingSender::new()),
                incidents: Box::new(MemoryIncidents::new()),
                alarm: Box::new(MemoryAlarm::new()),
            },
        );
        let mut r = ForegroundReconciler::suspended_since(clock.now());
        assert_eq!(r.resume(&mut m, clock.now()), Some(Reconciliation::Idle));
    }
}
