//! Trigger routing for a hosted session.
//!
//! `SwitchDriver` owns one machine and exposes one entry point per trigger
//! source: the foreground interval, durable wake delivery, suspend/resume and
//! the host's pause gate. All of them funnel into the machine's guarded
//! transitions, so the driver itself needs no locking.

use chrono::Duration;
use tracing::debug;

use crate::clock::Timestamp;
use crate::collaborators::AlarmPayload;
use crate::events::Event;
use crate::reachability::ReachabilityPoller;
use crate::reconciler::{ForegroundReconciler, Reconciliation};
use crate::switch::SwitchMachine;

pub struct SwitchDriver {
    machine: SwitchMachine,
    reconciler: ForegroundReconciler,
    poller: Option<ReachabilityPoller>,
    last_interval: Option<Timestamp>,
    gap_threshold: Duration,
}

impl SwitchDriver {
    pub fn new(machine: SwitchMachine, poller: Option<ReachabilityPoller>) -> Self {
        let gap_threshold = machine.settings().tick_interval * 2;
        Self {
            machine,
            reconciler: ForegroundReconciler::new(),
            poller,
            last_interval: None,
            gap_threshold,
        }
    }

    /// A driver for a host that was not running until now. The first
    /// `resume` reconciles whatever happened in between.
    pub fn suspended(machine: SwitchMachine, poller: Option<ReachabilityPoller>, since: Timestamp) -> Self {
        let mut driver = Self::new(machine, poller);
        driver.reconciler = ForegroundReconciler::suspended_since(since);
        driver
    }

    pub fn machine(&self) -> &SwitchMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut SwitchMachine {
        &mut self.machine
    }

    /// How long the host may wait before the next `on_interval`: one tick,
    /// or less when a deadline falls sooner. Never below `floor`.
    pub fn next_wait(&self, now: Timestamp, floor: Duration) -> Duration {
        let tick = self.machine.settings().tick_interval;
        let wait = self
            .machine
            .next_tick_at(now)
            .map_or(tick, |at| at - now);
        wait.max(floor)
    }

    /// The regular once-per-tick callback. Does nothing while suspended.
    ///
    /// A gap much longer than the tick interval means the host slept without
    /// telling us; that is handled as a suspend at the last tick followed by
    /// a resume now.
    pub fn on_interval(&mut self, now: Timestamp) -> Vec<Event> {
        let mut events = Vec::new();
        if !self.reconciler.is_active() {
            return events;
        }
        if let Some(last) = self.last_interval {
            if now - last > self.gap_threshold {
                debug!(gap_ms = (now - last).num_milliseconds(), "clock gap, reconciling");
                self.suspend(last);
                events.extend(self.resume(now).and_then(reconciled_event));
            }
        }
        self.last_interval = Some(now);

        events.extend(self.machine.tick(now));
        events.extend(self.machine.fire_cadence(now));
        events.extend(self.machine.fire_reminder(now));
        if let Some(poller) = self.poller.as_mut() {
            events.extend(poller.poll_if_due(&mut self.machine, now));
        }
        events
    }

    pub fn on_alarm(&mut self, payload: &AlarmPayload, now: Timestamp) -> Option<Event> {
        self.machine.on_alarm(payload, now)
    }

    /// Poll the directory now, ignoring the poll interval.
    pub fn poll_reachability(&mut self) -> Option<Event> {
        let poller = self.poller.as_mut()?;
        if !ReachabilityPoller::is_wanted(&self.machine) {
            return None;
        }
        poller.poll(&mut self.machine)
    }

    /// Stop the interval until the next `resume`.
    pub fn suspend(&mut self, now: Timestamp) {
        self.reconciler.suspend(now);
        self.last_interval = None;
    }

    /// Reconcile first, then re-arm the interval.
    pub fn resume(&mut self, now: Timestamp) -> Option<Reconciliation> {
        let outcome = self.reconciler.resume(&mut self.machine, now)?;
        self.last_interval = Some(now);
        Some(outcome)
    }

    /// Apply the host's pause gate. Lifting it ticks immediately so a
    /// deadline that passed meanwhile is not left waiting for the interval.
    pub fn set_paused(&mut self, paused: bool, now: Timestamp) -> Vec<Event> {
        let mut events: Vec<Event> = self.machine.set_paused(paused).into_iter().collect();
        if !paused {
            events.extend(self.machine.tick(now));
        }
        events
    }
}

fn reconciled_event(outcome: Reconciliation) -> Option<Event> {
    match outcome {
        Reconciliation::Expired(event) => event,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ContactRef;
    use crate::clock::Clock;
    use crate::memory::{ManualClock, MemoryAlarm, MemoryIncidents, RecordingSender, StaticDirectory};
    use crate::switch::{Collaborators, Phase, SwitchSettings};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn driver(clock: &ManualClock, directory: &StaticDirectory) -> SwitchDriver {
        let machine = SwitchMachine::new(
            Uuid::new_v4(),
            SwitchSettings::default(),
            Collaborators {
                clock: Arc::new(clock.clone()),
                sender: Box::new(RecordingSender::new()),
                incidents: Box::new(MemoryIncidents::new()),
                alarm: Box::new(MemoryAlarm::new()),
            },
        );
        let poller = ReachabilityPoller::new(Box::new(directory.clone()), Duration::seconds(3));
        SwitchDriver::new(machine, Some(poller))
    }

    #[test]
    fn interval_polls_then_ticks_to_escalation() {
        let clock = ManualClock::new(Utc::now());
        let directory = StaticDirectory::new();
        directory.mark_reachable("alice");
        let mut d = driver(&clock, &directory);
        d.machine_mut().add_contact(ContactRef::new("alice"));

        let events = d.on_interval(clock.now());
        assert!(matches!(events.as_slice(), [Event::MonitoringStarted { .. }]));

        let mut escalated = false;
        for _ in 0..5 {
            let now = clock.advance(Duration::seconds(1));
            escalated |= d
                .on_interval(now)
                .iter()
                .any(|e| matches!(e, Event::EscalationStarted { .. }));
        }
        assert!(escalated);
        assert_eq!(d.machine().phase(), Phase::Escalating);
    }

    #[test]
    fn suspended_driver_ignores_interval() {
        let clock = ManualClock::new(Utc::now());
        let directory = StaticDirectory::new();
        let mut d = driver(&clock, &directory);
        d.machine_mut().add_contact(ContactRef::new("alice"));
        d.machine_mut().on_contact_reachable();

        d.suspend(clock.now());
        let now = clock.advance(Duration::seconds(8));
        assert!(d.on_interval(now).is_empty());
        assert_eq!(d.machine().phase(), Phase::Monitoring);

        assert!(matches!(d.resume(now), Some(Reconciliation::Expired(Some(_)))));
        assert_eq!(d.machine().phase(), Phase::Escalating);
    }

    #[test]
    fn explicit_poll_skips_interval_but_not_phase_check() {
        let clock = ManualClock::new(Utc::now());
        let directory = StaticDirectory::new();
        directory.mark_reachable("alice");
        let mut d = driver(&clock, &directory);
        assert!(d.poll_reachability().is_none());
        assert_eq!(directory.polls(), 0);

        d.machine_mut().add_contact(ContactRef::new("alice"));
        assert!(matches!(
            d.poll_reachability(),
            Some(Event::MonitoringStarted { .. })
        ));
        assert!(d.poll_reachability().is_none());
        assert_eq!(directory.polls(), 1);
    }

    #[test]
    fn clock_gap_is_reconciled_once() {
        let clock = ManualClock::new(Utc::now());
        let directory = StaticDirectory::new();
        let mut d = driver(&clock, &directory);
        d.machine_mut().add_contact(ContactRef::new("alice"));
        d.machine_mut().on_contact_reachable();
        d.on_interval(clock.now());

        let now = clock.advance(Duration::seconds(9));
        let events = d.on_interval(now);
        let escalations = events
            .iter()
            .filter(|e| matches!(e, Event::EscalationStarted { .. }))
            .count();
        assert_eq!(escalations, 1);
    }

    #[test]
    fn next_wait_shrinks_to_deadline() {
        let clock = ManualClock::new(Utc::now());
        let directory = StaticDirectory::new();
        let mut d = driver(&clock, &directory);
        let floor = Duration::milliseconds(50);
        assert_eq!(d.next_wait(clock.now(), floor), Duration::seconds(1));

        d.machine_mut().add_contact(ContactRef::new("alice"));
        d.machine_mut().on_contact_reachable();
        let now = clock.advance(Duration::milliseconds(4700));
        assert_eq!(d.next_wait(now, floor), Duration::milliseconds(300));

        // Overdue but not yet ticked (for example while paused).
        let now = clock.advance(Duration::seconds(2));
        assert_eq!(d.next_wait(now, floor), floor);
    }

    #[test]
    fn interval_emits_check_in_reminders() {
        let clock = ManualClock::new(Utc::now());
        let directory = StaticDirectory::new();
        let mut d = driver(&clock, &directory);
        d.machine_mut().add_contact(ContactRef::new("alice"));
        d.machine_mut().on_contact_reachable();
        d.on_interval(clock.now());

        let now = clock.advance(Duration::seconds(1));
        assert!(d
            .on_interval(now)
            .iter()
            .any(|e| matches!(e, Event::ReminderDue { .. })));
    }
}
