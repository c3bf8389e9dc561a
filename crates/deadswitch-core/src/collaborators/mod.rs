//! Interfaces the core consumes from the outside world.
//!
//! Collaborators are transport-agnostic. Every call may fail; the core catches
//! the failure at the call site, logs it and carries on with the last known
//! phase.

pub mod account;
pub mod auth;
pub mod fanout;
pub mod relay;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Timestamp;
use crate::error::CollaboratorError;
use crate::switch::Phase;

pub use account::AccountClient;
pub use auth::KeyringAuth;
pub use fanout::FanoutIncidents;
pub use relay::RelayClient;

/// A registered recipient of escalation messages.
///
/// Stored as entered (minus a leading `@`); compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactRef(String);

impl ContactRef {
    pub fn new(name: impl AsRef<str>) -> Self {
        let trimmed = name.as_ref().trim();
        Self(trimmed.trim_start_matches('@').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased, `@`-free key used for comparisons.
    pub fn normalized(&self) -> String {
        normalize_contact(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for ContactRef {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for ContactRef {}

impl fmt::Display for ContactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a contact id as the relay reports it.
pub fn normalize_contact(raw: &str) -> String {
    raw.trim().replace('@', "").to_lowercase()
}

/// Opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(pub String);

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// One terminal event, recorded once per escalation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub session_id: Uuid,
    pub cycle: u64,
    pub at: Timestamp,
}

/// Stable alarm ids, one per logical deadline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlarmSlot {
    MonitoringExpiry,
    EscalationExpiry,
}

impl AlarmSlot {
    pub fn id(self) -> &'static str {
        match self {
            AlarmSlot::MonitoringExpiry => "monitoring-expiry",
            AlarmSlot::EscalationExpiry => "escalation-expiry",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "monitoring-expiry" => Some(AlarmSlot::MonitoringExpiry),
            "escalation-expiry" => Some(AlarmSlot::EscalationExpiry),
            _ => None,
        }
    }

    /// The phase whose deadline this slot watches.
    pub fn phase(self) -> Phase {
        match self {
            AlarmSlot::MonitoringExpiry => Phase::Monitoring,
            AlarmSlot::EscalationExpiry => Phase::Escalating,
        }
    }

    pub fn for_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Monitoring => Some(AlarmSlot::MonitoringExpiry),
            Phase::Escalating => Some(AlarmSlot::EscalationExpiry),
            _ => None,
        }
    }
}

/// What a durable alarm carries back on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub phase: Phase,
    pub deadline: Timestamp,
}

/// Current credential; the core never authenticates by itself.
pub trait AuthSession: Send + Sync {
    fn token(&self) -> Option<Token>;
}

/// Lists contacts that can currently receive messages.
pub trait ContactDirectory: Send + Sync {
    /// Normalized ids (see [`normalize_contact`]).
    fn list_reachable(&self) -> Result<BTreeSet<String>, CollaboratorError>;
}

/// Delivers one message to one contact. No retry, no ordering guarantee.
pub trait MessageSender: Send + Sync {
    fn send(&self, contact: &ContactRef, text: &str) -> Result<(), CollaboratorError>;
}

/// Persists incidents. Implementations should ignore duplicates, although
/// the core already calls this at most once per cycle.
pub trait IncidentStore: Send + Sync {
    /// Reserve the terminal effect for `incident`'s session and cycle.
    ///
    /// `Ok(false)` means another host already claimed it and the final
    /// alert must not go out again. Stores with no shared state accept.
    fn claim(&self, _incident: &Incident) -> Result<bool, CollaboratorError> {
        Ok(true)
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), CollaboratorError>;
}

/// Wake primitive that fires even while the host process is suspended.
///
/// Scheduling an id that is already scheduled replaces it.
pub trait DurableAlarm: Send + Sync {
    fn schedule(
        &self,
        slot: AlarmSlot,
        fire_at: Timestamp,
        payload: &AlarmPayload,
    ) -> Result<(), CollaboratorError>;

    fn cancel(&self, slot: AlarmSlot) -> Result<(), CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_ref_strips_at_and_compares_case_insensitively() {
        let a = ContactRef::new("@Alice");
        assert_eq!(a.as_str(), "Alice");
        assert_eq!(a, ContactRef::new("alice"));
        assert_ne!(a, ContactRef::new("bob"));
    }

    #[test]
    fn alarm_slot_ids_round_trip() {
        for slot in [AlarmSlot::MonitoringExpiry, AlarmSlot::EscalationExpiry] {
            assert_eq!(AlarmSlot::from_id(slot.id()), Some(slot));
            assert_eq!(AlarmSlot::for_phase(slot.phase()), Some(slot));
        }
        assert_eq!(AlarmSlot::from_id("nope"), None);
    }

    #[test]
    fn token_debug_is_redacted() {
        let t = Token("secret".into());
        assert_eq!(format!("{t:?}"), "Token(***)");
    }
}
