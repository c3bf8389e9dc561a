//! Dead-man's-switch state machine.
//!
//! The machine is a wall-clock-based state machine. It does not use internal
//! threads - the host calls `tick()` at least once per second while a deadline
//! is live, `fire_cadence()` at the same rate while escalating,
//! `fire_reminder()` while monitoring, and `on_alarm()` when a durable wake is
//! delivered.
//!
//! ## State Transitions
//!
//! ```text
//! Setup -> Waiting -> Monitoring -> Escalating -> Terminal
//! ```
//!
//! Every trigger source ends up in the same guarded transitions. A guard is
//! checked and closed before any side effect runs, so a duplicate or stale
//! trigger finds the phase already moved and does nothing. Calls that are not
//! valid in the current phase are ignored, never reported as errors.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Collaborators, Phase, Session, SwitchSettings};
use crate::clock::{after, remaining_secs, Clock, Timestamp};
use crate::collaborators::{AlarmPayload, ContactRef, Incident, IncidentStore};
use crate::events::Event;
use crate::notifier::{Cadence, CancelFlag, Notifier};
use crate::scheduler::{ArmedDeadline, DeadlineScheduler};

pub struct SwitchMachine {
    session: Session,
    settings: SwitchSettings,
    clock: Arc<dyn Clock>,
    scheduler: DeadlineScheduler,
    notifier: Notifier,
    cadence: Cadence,
    /// Check-in prompt while monitoring; `None` when disabled.
    reminder: Option<Cadence>,
    incidents: Box<dyn IncidentStore>,
}

impl SwitchMachine {
    /// Start a fresh session in `Setup`.
    pub fn new(session_id: Uuid, settings: SwitchSettings, collaborators: Collaborators) -> Self {
        Self::build(Session::new(session_id), settings, collaborators)
    }

    /// Rebuild a machine around a persisted session.
    ///
    /// The live deadline is re-armed (cancel, then schedule) so the durable
    /// wake always matches the stored deadline. Expired deadlines are kept
    /// as-is; the next `tick` or resume reconciliation handles them.
    pub fn restore(session: Session, settings: SwitchSettings, collaborators: Collaborators) -> Self {
        let mut machine = Self::build(session, settings, collaborators);
        let now = machine.clock.now();
        machine.resync(now);
        machine
    }

    /// Take over a newer copy of the session that another host saved.
    ///
    /// Timers that still describe the same phase keep running: the cadence
    /// survives if the cycle is unchanged and the reminder survives if the
    /// monitoring deadline is. Everything else is rebuilt as in `restore`.
    pub fn adopt(&mut self, session: Session) {
        let now = self.clock.now();
        let previous = std::mem::replace(&mut self.session, session);
        previous.stop_sending.raise();

        let s = &self.session;
        if previous.phase != Phase::Escalating
            || s.phase != Phase::Escalating
            || previous.cycle != s.cycle
        {
            self.cadence.disarm();
        }
        if previous.monitoring_deadline != s.monitoring_deadline {
            self.disarm_reminder();
        }
        self.resync(now);
        info!(
            revision = self.session.revision,
            phase = %self.session.phase,
            "adopted stored session"
        );
    }

    /// Record the revision the session was just saved as.
    pub fn mark_persisted(&mut self, revision: u64) {
        self.session.revision = revision;
    }

    fn build(session: Session, settings: SwitchSettings, collaborators: Collaborators) -> Self {
        let scheduler = DeadlineScheduler::new(collaborators.alarm, settings.tick_interval);
        let cadence = Cadence::new(settings.cadence_interval);
        let reminder = settings.reminder_interval.map(Cadence::new);
        Self {
            session,
            clock: collaborators.clock,
            scheduler,
            notifier: Notifier::new(collaborators.sender),
            cadence,
            reminder,
            incidents: collaborators.incidents,
            settings,
        }
    }

    /// Re-derive alarms, timers and the stop flag from the session.
    /// Cancel-then-set keeps the durable wake equal to the stored deadline.
    fn resync(&mut self, now: Timestamp) {
        self.repair(now);

        match self.session.active_deadline() {
            Some(deadline) => self.scheduler.arm(self.session.phase, deadline),
            None => self.scheduler.disarm_all(),
        }
        if self.session.phase == Phase::Escalating {
            self.session.stop_sending.clear();
            if !self.cadence.is_armed() {
                self.cadence.arm(now);
            }
        } else {
            self.session.stop_sending.raise();
            self.cadence.disarm();
        }
        if self.session.phase == Phase::Monitoring {
            if let Some(reminder) = self.reminder.as_mut().filter(|r| !r.is_armed()) {
                reminder.arm(now);
            }
        } else {
            self.disarm_reminder();
        }
    }

    /// Bring a hand-edited or older session back within the invariants.
    fn repair(&mut self, now: Timestamp) {
        let s = &mut self.session;
        if s.phase.requires_contact() && s.contacts.is_empty() {
            warn!(phase = %s.phase, "restored session has no contacts, falling back to setup");
            s.phase = Phase::Setup;
        }
        if s.phase == Phase::Monitoring && s.monitoring_deadline.is_none() {
            s.monitoring_deadline = Some(after(now, self.settings.monitoring_window));
        }
        if s.phase == Phase::Escalating && s.escalation_deadline.is_none() {
            s.escalation_deadline = Some(after(now, self.settings.escalation_window));
        }
        if s.phase != Phase::Monitoring {
            s.monitoring_deadline = None;
        }
        if s.phase != Phase::Escalating {
            s.escalation_deadline = None;
        }
        // Only a terminal phase may hold the guard closed.
        s.terminal_effect_applied = s.phase == Phase::Terminal;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The deadline currently backing the live phase.
    pub fn armed(&self) -> Option<ArmedDeadline> {
        self.scheduler.armed()
    }

    /// When the host should tick next, if a deadline is live.
    pub fn next_tick_at(&self, now: Timestamp) -> Option<Timestamp> {
        self.scheduler.next_tick_at(now)
    }

    /// Countdown shown to the user, in whole seconds.
    pub fn remaining_secs(&self, now: Timestamp) -> Option<u64> {
        self.session
            .active_deadline()
            .map(|deadline| remaining_secs(deadline, now))
    }

    /// Handle that stops in-flight sends without going through the machine.
    ///
    /// Raising it from another thread bounds outstanding work to the send in
    /// progress; follow up with [`Self::report_false_alarm`].
    pub fn stop_handle(&self) -> CancelFlag {
        self.session.stop_sending.clone()
    }

    pub fn snapshot(&self) -> Event {
        let now = self.clock.now();
        let s = &self.session;
        Event::StateSnapshot {
            phase: s.phase,
            remaining_secs: self.remaining_secs(now),
            deadline: s.active_deadline(),
            contacts: s.contacts.iter().map(|c| c.to_string()).collect(),
            reachable: s.reachable.iter().map(|c| c.to_string()).collect(),
            notifications_sent: s.notifications_sent,
            message_cursor: s.message_cursor,
            cycle: s.cycle,
            paused: s.paused,
            terminal_effect_applied: s.terminal_effect_applied,
            at: now,
        }
    }

    // ── Contacts ─────────────────────────────────────────────────────

    /// Register a contact. The first contact moves `Setup` to `Waiting`.
    pub fn add_contact(&mut self, contact: ContactRef) -> Option<Event> {
        if contact.is_empty() || self.session.has_contact(&contact) {
            return None;
        }
        let at = self.clock.now();
        info!(contact = %contact, "contact added");
        self.session.contacts.push(contact.clone());
        if self.session.phase == Phase::Setup {
            self.session.phase = Phase::Waiting;
        }
        Some(Event::ContactAdded {
            contact: contact.to_string(),
            phase: self.session.phase,
            at,
        })
    }

    /// Unregister a contact. Removing the last one while a contact is
    /// required returns the session to `Setup`.
    pub fn remove_contact(&mut self, contact: &ContactRef) -> Option<Event> {
        let before = self.session.contacts.len();
        self.session.contacts.retain(|c| c != contact);
        if self.session.contacts.len() == before {
            return None;
        }
        self.session.reachable.retain(|c| c != contact);
        info!(contact = %contact, "contact removed");

        if self.session.contacts.is_empty() && self.session.phase.requires_contact() {
            self.enter_setup();
        }
        Some(Event::ContactRemoved {
            contact: contact.to_string(),
            phase: self.session.phase,
            at: self.clock.now(),
        })
    }

    /// Record which registered contacts the directory currently reports.
    pub fn set_reachable(&mut self, reachable: Vec<ContactRef>) {
        self.session.reachable = reachable;
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// A registered contact became reachable: start the countdown.
    ///
    /// Ignored once monitoring has begun, so spurious pings never reset a
    /// running countdown or downgrade an escalation.
    pub fn on_contact_reachable(&mut self) -> Option<Event> {
        let eligible = match self.session.phase {
            Phase::Waiting => true,
            Phase::Setup => !self.session.contacts.is_empty(),
            _ => false,
        };
        if !eligible || self.session.paused {
            return None;
        }
        let now = self.clock.now();
        let deadline = self.enter_monitoring(now);
        info!(%deadline, "contact reachable, monitoring started");
        Some(Event::MonitoringStarted { deadline, at: now })
    }

    /// The user checked in. Restores the full monitoring window.
    pub fn confirm_alive(&mut self) -> Option<Event> {
        if self.session.phase != Phase::Monitoring {
            debug!(phase = %self.session.phase, "check-in ignored");
            return None;
        }
        let now = self.clock.now();
        let deadline = self.enter_monitoring(now);
        debug!(%deadline, "checked in");
        Some(Event::CheckedIn { deadline, at: now })
    }

    /// Drive expiry for the live phase. Safe to call from any trigger
    /// source, any number of times.
    pub fn tick(&mut self, now: Timestamp) -> Option<Event> {
        if self.session.paused {
            return None;
        }
        match self.session.phase {
            Phase::Monitoring => {
                let deadline = self.session.monitoring_deadline?;
                if deadline > now {
                    return None;
                }
                Some(self.escalate(now))
            }
            Phase::Escalating => {
                let deadline = self.session.escalation_deadline?;
                if deadline > now {
                    return None;
                }
                self.enter_terminal(now)
            }
            _ => None,
        }
    }

    /// A durable wake was delivered. Payloads that no longer match the live
    /// phase and deadline are stale and ignored.
    pub fn on_alarm(&mut self, payload: &AlarmPayload, now: Timestamp) -> Option<Event> {
        let current = self.session.active_deadline();
        if payload.phase != self.session.phase || current != Some(payload.deadline) {
            debug!(
                alarm_phase = %payload.phase,
                phase = %self.session.phase,
                "stale alarm ignored"
            );
            return None;
        }
        self.tick(now)
    }

    /// Send the next cadence round if one is due.
    pub fn fire_cadence(&mut self, now: Timestamp) -> Option<Event> {
        if self.session.paused
            || self.session.phase != Phase::Escalating
            || self.session.stop_sending.is_raised()
        {
            return None;
        }
        if !self.cadence.take_due(now) {
            return None;
        }
        let delivered = self.send_round();
        Some(Event::NotificationsSent {
            cycle: self.session.cycle,
            delivered,
            total: self.session.notifications_sent,
            at: now,
        })
    }

    /// Prompt the user to check in if the reminder interval has elapsed.
    /// Only fires while monitoring; every check-in restarts the interval.
    pub fn fire_reminder(&mut self, now: Timestamp) -> Option<Event> {
        if self.session.paused || self.session.phase != Phase::Monitoring {
            return None;
        }
        if !self.reminder.as_mut()?.take_due(now) {
            return None;
        }
        let deadline = self.session.monitoring_deadline?;
        Some(Event::ReminderDue {
            deadline,
            remaining_secs: remaining_secs(deadline, now),
            at: now,
        })
    }

    /// The user is fine after all: stop escalating and resume monitoring.
    pub fn report_false_alarm(&mut self) -> Option<Event> {
        if self.session.phase != Phase::Escalating {
            return None;
        }
        // Raised before the cadence goes so an in-flight round stops early.
        self.session.stop_sending.raise();
        self.cadence.disarm();

        let now = self.clock.now();
        self.session.escalation_deadline = None;
        self.session.reset_counters();
        let deadline = self.enter_monitoring(now);
        info!(cycle = self.session.cycle, "false alarm reported");
        Some(Event::FalseAlarm {
            cycle: self.session.cycle,
            deadline,
            at: now,
        })
    }

    /// Begin a new cycle after a terminal one. The only way to reopen the
    /// terminal guard.
    pub fn restart(&mut self) -> Option<Event> {
        if self.session.phase != Phase::Terminal {
            return None;
        }
        let now = self.clock.now();
        self.session.terminal_effect_applied = false;
        self.session.reset_counters();

        let deadline = if self.session.contacts.is_empty() {
            self.enter_setup();
            None
        } else {
            Some(self.enter_monitoring(now))
        };
        info!(phase = %self.session.phase, "restarted");
        Some(Event::Restarted {
            phase: self.session.phase,
            deadline,
            at: now,
        })
    }

    /// Host gate: while paused, ticks, cadence and reachability transitions
    /// are skipped. Deadlines are left untouched, so time keeps counting.
    pub fn set_paused(&mut self, paused: bool) -> Option<Event> {
        if self.session.paused == paused {
            return None;
        }
        self.session.paused = paused;
        debug!(paused, "pause gate changed");
        Some(Event::PauseChanged {
            paused,
            at: self.clock.now(),
        })
    }

    /// Destroy session state (logout or explicit reset).
    pub fn reset(&mut self) -> Event {
        self.session.stop_sending.raise();
        self.cadence.disarm();
        self.disarm_reminder();
        self.scheduler.disarm_all();

        let s = &mut self.session;
        s.phase = Phase::Setup;
        s.monitoring_deadline = None;
        s.escalation_deadline = None;
        s.contacts.clear();
        s.reachable.clear();
        s.terminal_effect_applied = false;
        s.paused = false;
        s.reset_counters();
        info!("session reset");
        Event::SessionReset {
            at: self.clock.now(),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn enter_monitoring(&mut self, now: Timestamp) -> Timestamp {
        let deadline = after(now, self.settings.monitoring_window);
        self.session.phase = Phase::Monitoring;
        self.session.monitoring_deadline = Some(deadline);
        self.session.escalation_deadline = None;
        self.scheduler.arm(Phase::Monitoring, deadline);
        if let Some(reminder) = self.reminder.as_mut() {
            reminder.arm(now);
        }
        deadline
    }

    fn disarm_reminder(&mut self) {
        if let Some(reminder) = self.reminder.as_mut() {
            reminder.disarm();
        }
    }

    fn enter_setup(&mut self) {
        self.session.stop_sending.raise();
        self.cadence.disarm();
        self.disarm_reminder();
        self.scheduler.disarm_all();
        self.session.phase = Phase::Setup;
        self.session.monitoring_deadline = None;
        self.session.escalation_deadline = None;
        self.session.reset_counters();
    }

    fn escalate(&mut self, now: Timestamp) -> Event {
        // Phase flips before anything is sent.
        self.session.phase = Phase::Escalating;
        self.session.monitoring_deadline = None;
        self.disarm_reminder();
        let deadline = after(now, self.settings.escalation_window);
        self.session.escalation_deadline = Some(deadline);
        self.session.cycle += 1;
        self.session.reset_counters();
        debug_assert!(!self.session.terminal_effect_applied);
        self.session.terminal_effect_applied = false;
        self.session.stop_sending.clear();
        self.scheduler.arm(Phase::Escalating, deadline);

        info!(cycle = self.session.cycle, %deadline, "check-in missed, escalating");
        let delivered = self.send_round();
        self.cadence.arm(now);
        Event::EscalationStarted {
            cycle: self.session.cycle,
            deadline,
            delivered,
            at: now,
        }
    }

    fn send_round(&mut self) -> u64 {
        let message = self.settings.messages.at(self.session.message_cursor);
        let delivered =
            self.notifier
                .notify_all(&self.session.contacts, message, &self.session.stop_sending);
        self.session.message_cursor =
            (self.session.message_cursor + 1) % self.settings.messages.len();
        self.session.notifications_sent += delivered;
        debug!(
            cycle = self.session.cycle,
            delivered,
            total = self.session.notifications_sent,
            "escalation round sent"
        );
        delivered
    }

    fn enter_terminal(&mut self, now: Timestamp) -> Option<Event> {
        if self.session.terminal_effect_applied {
            return None;
        }
        self.session.terminal_effect_applied = true;
        self.session.phase = Phase::Terminal;
        self.session.escalation_deadline = None;

        self.session.stop_sending.raise();
        self.cadence.disarm();
        self.scheduler.disarm_all();

        let notifications_sent = self.session.notifications_sent;
        self.session.reset_counters();

        let incident = Incident {
            session_id: self.session.id(),
            cycle: self.session.cycle,
            at: now,
        };
        let claimed = match self.incidents.claim(&incident) {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(cycle = incident.cycle, error = %e, "incident claim failed, alerting anyway");
                true
            }
        };
        if !claimed {
            info!(cycle = self.session.cycle, "terminal effect already applied elsewhere");
            return Some(Event::TerminalReached {
                cycle: self.session.cycle,
                notifications_sent,
                final_delivered: 0,
                incident_recorded: false,
                claimed: false,
                at: now,
            });
        }

        let final_delivered = self
            .notifier
            .broadcast(&self.session.contacts, self.settings.messages.final_text());

        let incident_recorded = match self.incidents.record_incident(&incident) {
            Ok(()) => true,
            Err(e) => {
                warn!(cycle = incident.cycle, error = %e, "incident record failed");
                false
            }
        };
        info!(
            cycle = self.session.cycle,
            final_delivered, incident_recorded, "escalation window elapsed, terminal"
        );
        Some(Event::TerminalReached {
            cycle: self.session.cycle,
            notifications_sent,
            final_delivered,
            incident_recorded,
            claimed: true,
            at: now,
        })
    }
}
