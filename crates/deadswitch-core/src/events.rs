use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::switch::Phase;

/// Every state change in the switch produces an Event.
/// Hosts print or forward them; nothing inside the core consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ContactAdded {
        contact: String,
        phase: Phase,
        at: Timestamp,
    },
    ContactRemoved {
        contact: String,
        phase: Phase,
        at: Timestamp,
    },
    /// A registered contact became reachable; the countdown started.
    MonitoringStarted {
        deadline: Timestamp,
        at: Timestamp,
    },
    /// Monitoring is running and the user should check in.
    ReminderDue {
        deadline: Timestamp,
        remaining_secs: u64,
        at: Timestamp,
    },
    /// User confirmed they are fine; countdown restarted.
    CheckedIn {
        deadline: Timestamp,
        at: Timestamp,
    },
    /// Check-in window elapsed; contacts are being alerted.
    EscalationStarted {
        cycle: u64,
        deadline: Timestamp,
        delivered: u64,
        at: Timestamp,
    },
    /// One cadence round finished.
    NotificationsSent {
        cycle: u64,
        delivered: u64,
        total: u64,
        at: Timestamp,
    },
    /// Escalation window elapsed. `claimed` is false when another host had
    /// already run the terminal effect for this cycle, so nothing was sent.
    TerminalReached {
        cycle: u64,
        notifications_sent: u64,
        final_delivered: u64,
        incident_recorded: bool,
        claimed: bool,
        at: Timestamp,
    },
    FalseAlarm {
        cycle: u64,
        deadline: Timestamp,
        at: Timestamp,
    },
    /// New cycle after a terminal one. Without contacts the session falls
    /// back to `Setup` and carries no deadline.
    Restarted {
        phase: Phase,
        deadline: Option<Timestamp>,
        at: Timestamp,
    },
    PauseChanged {
        paused: bool,
        at: Timestamp,
    },
    SessionReset {
        at: Timestamp,
    },
    StateSnapshot {
        phase: Phase,
        remaining_secs: Option<u64>,
        deadline: Option<Timestamp>,
        contacts: Vec<String>,
        reachable: Vec<String>,
        notifications_sent: u64,
        message_cursor: usize,
        cycle: u64,
        paused: bool,
        terminal_effect_applied: bool,
        at: Timestamp,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ContactAdded { .. } => "ContactAdded",
            Event::ContactRemoved { .. } => "ContactRemoved",
            Event::MonitoringStarted { .. } => "MonitoringStarted",
            Event::ReminderDue { .. } => "ReminderDue",
            Event::CheckedIn { .. } => "CheckedIn",
            Event::EscalationStarted { .. } => "EscalationStarted",
            Event::NotificationsSent { .. } => "NotificationsSent",
            Event::TerminalReached { .. } => "TerminalReached",
            Event::FalseAlarm { .. } => "FalseAlarm",
            Event::Restarted { .. } => "Restarted",
            Event::PauseChanged { .. } => "PauseChanged",
            Event::SessionReset { .. } => "SessionReset",
            Event::StateSnapshot { .. } => "StateSnapshot",
        }
    }
}
