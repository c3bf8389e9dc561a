mod machine;
mod phase;
mod session;

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::collaborators::{DurableAlarm, IncidentStore, MessageSender};
use crate::notifier::MessageCycle;

pub use machine::SwitchMachine;
pub use phase::Phase;
pub use session::Session;

/// Fixed durations and texts, read once when the machine is built.
#[derive(Debug, Clone)]
pub struct SwitchSettings {
    pub monitoring_window: Duration,
    pub escalation_window: Duration,
    pub cadence_interval: Duration,
    pub tick_interval: Duration,
    /// Check-in prompt interval while monitoring; `None` disables it.
    pub reminder_interval: Option<Duration>,
    pub messages: MessageCycle,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            monitoring_window: Duration::seconds(5),
            escalation_window: Duration::seconds(20),
            cadence_interval: Duration::seconds(1),
            tick_interval: Duration::seconds(1),
            reminder_interval: Some(Duration::seconds(1)),
            messages: MessageCycle::default(),
        }
    }
}

/// Outside services the machine drives.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub sender: Box<dyn MessageSender>,
    pub incidents: Box<dyn IncidentStore>,
    pub alarm: Box<dyn DurableAlarm>,
}
