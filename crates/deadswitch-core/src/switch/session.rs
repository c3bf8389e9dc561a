use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Phase;
use crate::clock::Timestamp;
use crate::collaborators::ContactRef;
use crate::notifier::CancelFlag;

/// Live dead-man's-switch state for one authenticated user.
///
/// Mutated only by [`super::SwitchMachine`]; everything else reads it through
/// accessors or a snapshot. Serialized as a whole so a restarted host can
/// reconcile against the stored deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    pub(crate) phase: Phase,
    #[serde(default)]
    pub(crate) monitoring_deadline: Option<Timestamp>,
    #[serde(default)]
    pub(crate) escalation_deadline: Option<Timestamp>,
    /// Insertion order is notification order.
    #[serde(default)]
    pub(crate) contacts: Vec<ContactRef>,
    /// Contacts the directory last reported as reachable.
    #[serde(default)]
    pub(crate) reachable: Vec<ContactRef>,
    #[serde(default)]
    pub(crate) notifications_sent: u64,
    #[serde(default)]
    pub(crate) terminal_effect_applied: bool,
    #[serde(default)]
    pub(crate) message_cursor: usize,
    /// Escalation cycles entered so far; identifies incidents.
    #[serde(default)]
    pub(crate) cycle: u64,
    #[serde(default)]
    pub(crate) paused: bool,
    /// Raised whenever the phase is not `Escalating`. Rebuilt on restore.
    #[serde(skip, default = "raised_flag")]
    pub(crate) stop_sending: CancelFlag,
    /// Stored revision this copy was loaded from or last saved as.
    #[serde(skip)]
    pub(crate) revision: u64,
}

fn raised_flag() -> CancelFlag {
    CancelFlag::new(true)
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: Phase::Setup,
            monitoring_deadline: None,
            escalation_deadline: None,
            contacts: Vec::new(),
            reachable: Vec::new(),
            notifications_sent: 0,
            terminal_effect_applied: false,
            message_cursor: 0,
            cycle: 0,
            paused: false,
            stop_sending: raised_flag(),
            revision: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn monitoring_deadline(&self) -> Option<Timestamp> {
        self.monitoring_deadline
    }

    pub fn escalation_deadline(&self) -> Option<Timestamp> {
        self.escalation_deadline
    }

    /// Deadline of the live phase, if any.
    pub fn active_deadline(&self) -> Option<Timestamp> {
        match self.phase {
            Phase::Monitoring => self.monitoring_deadline,
            Phase::Escalating => self.escalation_deadline,
            _ => None,
        }
    }

    pub fn contacts(&self) -> &[ContactRef] {
        &self.contacts
    }

    pub fn reachable(&self) -> &[ContactRef] {
        &self.reachable
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent
    }

    pub fn terminal_effect_applied(&self) -> bool {
        self.terminal_effect_applied
    }

    pub fn message_cursor(&self) -> usize {
        self.message_cursor
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn should_stop_sending(&self) -> bool {
        self.stop_sending.is_raised()
    }

    pub fn has_contact(&self, contact: &ContactRef) -> bool {
        self.contacts.contains(contact)
    }

    /// Checks the structural invariants. Returns the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.monitoring_deadline.is_some() != (self.phase == Phase::Monitoring) {
            return Err(format!(
                "monitoring deadline {:?} in phase {}",
                self.monitoring_deadline, self.phase
            ));
        }
        if self.escalation_deadline.is_some() != (self.phase == Phase::Escalating) {
            return Err(format!(
                "escalation deadline {:?} in phase {}",
                self.escalation_deadline, self.phase
            ));
        }
        if self.phase.requires_contact() && self.contacts.is_empty() {
            return Err(format!("no contacts in phase {}", self.phase));
        }
        if self.phase == Phase::Terminal && !self.terminal_effect_applied {
            return Err("terminal phase without applied effect".into());
        }
        Ok(())
    }

    /// Drops the escalation state of the current cycle.
    pub(crate) fn reset_counters(&mut self) {
        self.notifications_sent = 0;
        self.message_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn new_session_is_setup_and_valid() {
        let s = Session::new(Uuid::new_v4());
        assert_eq!(s.phase(), Phase::Setup);
        assert!(s.should_stop_sending());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn invariant_check_catches_stray_deadline() {
        let mut s = Session::new(Uuid::new_v4());
        s.monitoring_deadline = Some(Utc::now());
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn stop_flag_is_raised_after_deserialize() {
        let mut s = Session::new(Uuid::new_v4());
        s.stop_sending.clear();
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert!(back.should_stop_sending());
        assert_eq!(back.id(), s.id());
    }
}
