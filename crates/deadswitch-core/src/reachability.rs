//! Contact reachability polling.
//!
//! While the session waits for its first reachable contact, the directory is
//! asked every few seconds which contacts can receive messages. A failed poll
//! is an infrastructure problem, not an unreachable contact: the phase stays
//! where it was.

use chrono::Duration;
use tracing::{debug, warn};

use crate::clock::Timestamp;
use crate::collaborators::{ContactDirectory, ContactRef};
use crate::events::Event;
use crate::switch::{Phase, SwitchMachine};

pub struct ReachabilityPoller {
    directory: Box<dyn ContactDirectory>,
    interval: Duration,
    next_poll: Option<Timestamp>,
}

impl ReachabilityPoller {
    pub fn new(directory: Box<dyn ContactDirectory>, interval: Duration) -> Self {
        Self {
            directory,
            interval,
            next_poll: None,
        }
    }

    /// Polling only matters before monitoring has started.
    pub fn is_wanted(machine: &SwitchMachine) -> bool {
        match machine.phase() {
            Phase::Waiting => true,
            Phase::Setup => !machine.session().contacts().is_empty(),
            _ => false,
        }
    }

    /// Poll when wanted and the interval has elapsed.
    pub fn poll_if_due(&mut self, machine: &mut SwitchMachine, now: Timestamp) -> Option<Event> {
        if !Self::is_wanted(machine) {
            self.next_poll = None;
            return None;
        }
        if matches!(self.next_poll, Some(next) if now < next) {
            return None;
        }
        self.next_poll = Some(now + self.interval);
        self.poll(machine)
    }

    /// Ask the directory once and feed the result to the machine.
    pub fn poll(&mut self, machine: &mut SwitchMachine) -> Option<Event> {
        let listed = match self.directory.list_reachable() {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "reachability poll failed, keeping phase");
                return None;
            }
        };
        let reachable: Vec<ContactRef> = machine
            .session()
            .contacts()
            .iter()
            .filter(|c| listed.contains(&c.normalized()))
            .cloned()
            .collect();
        debug!(
            registered = machine.session().contacts().len(),
            reachable = reachable.len(),
            "reachability polled"
        );
        let any = !reachable.is_empty();
        machine.set_reachable(reachable);
        if any {
            machine.on_contact_reachable()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::memory::{ManualClock, MemoryAlarm, MemoryIncidents, RecordingSender, StaticDirectory};
    use crate::switch::{Collaborators, SwitchSettings};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn machine(clock: &ManualClock) -> SwitchMachine {
        SwitchMachine::new(
            Uuid::new_v4(),
            SwitchSettings::default(),
            Collaborators {
                clock: Arc::new(clock.clone()),
                sender: Box::new(RecordingSender::new()),
                incidents: Box::new(MemoryIncidents::new()),
                alarm: Box::new(MemoryAlarm::new()),
            },
        )
    }

    #[test]
    fn reachable_contact_starts_monitoring() {
        let clock = ManualClock::new(Utc::now());
        let mut m = machine(&clock);
        m.add_contact(ContactRef::new("@Alice"));
        let directory = StaticDirectory::new();
        let mut poller = ReachabilityPoller::new(Box::new(directory.clone()), Duration::seconds(3));

        assert!(poller.poll_if_due(&mut m, clock.now()).is_none());
        assert_eq!(m.phase(), Phase::Waiting);

        directory.mark_reachable("alice");
        // interval not elapsed yet
        assert!(poller.poll_if_due(&mut m, clock.now()).is_none());
        let later = clock.advance(Duration::seconds(3));
        assert!(matches!(
            poller.poll_if_due(&mut m, later),
            Some(Event::MonitoringStarted { .. })
        ));
        assert_eq!(m.phase(), Phase::Monitoring);
        assert_eq!(m.session().reachable().len(), 1);
    }

    #[test]
    fn failed_poll_keeps_phase() {
        let clock = ManualClock::new(Utc::now());
        let mut m = machine(&clock);
        m.add_contact(ContactRef::new("alice"));
        let directory = StaticDirectory::new();
        directory.mark_reachable("alice");
        directory.set_failing(true);
        let mut poller = ReachabilityPoller::new(Box::new(directory), Duration::seconds(3));

        assert!(poller.poll(&mut m).is_none());
        assert_eq!(m.phase(), Phase::Waiting);
    }

    #[test]
    fn no_polling_once_monitoring() {
        let clock = ManualClock::new(Utc::now());
        let mut m = machine(&clock);
        m.add_contact(ContactRef::new("alice"));
        m.on_contact_reachable();
        let directory = StaticDirectory::new();
        let mut poller = ReachabilityPoller::new(Box::new(directory.clone()), Duration::seconds(3));

        assert!(poller.poll_if_due(&mut m, clock.now()).is_none());
        assert_eq!(directory.polls(), 0);
    }
}
