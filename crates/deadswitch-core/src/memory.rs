//! In-process collaborator implementations.
//!
//! Used by hosts that have no durable store and throughout the test suites.
//! Every type is a cheap handle over shared state, so a clone handed to the
//! machine can still be inspected from outside.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use uuid::Uuid;

use crate::clock::{Clock, Timestamp};
use crate::collaborators::{
    normalize_contact, AlarmPayload, AlarmSlot, AuthSession, ContactDirectory, ContactRef,
    DurableAlarm, Incident, IncidentStore, MessageSender, Token,
};
use crate::error::CollaboratorError;
use crate::notifier::CancelFlag;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<Timestamp>>);

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn set(&self, t: Timestamp) {
        *lock(&self.0) = t;
    }

    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut now = lock(&self.0);
        *now += by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *lock(&self.0)
    }
}

#[derive(Debug, Default)]
struct SenderState {
    attempts: Vec<(String, String)>,
    failing: BTreeSet<String>,
    raise_on_send: Option<CancelFlag>,
}

/// Records every send attempt; individual contacts can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingSender(Arc<Mutex<SenderState>>);

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery to `contact` fails from now on.
    pub fn fail_for(&self, contact: &str) {
        lock(&self.0).failing.insert(normalize_contact(contact));
    }

    /// Raise `flag` during each send, as a concurrent stop request would.
    pub fn raise_on_send(&self, flag: CancelFlag) {
        lock(&self.0).raise_on_send = Some(flag);
    }

    /// `(contact, text)` for every attempt, in order.
    pub fn attempts(&self) -> Vec<(String, String)> {
        lock(&self.0).attempts.clone()
    }

    pub fn attempts_with(&self, text: &str) -> usize {
        lock(&self.0).attempts.iter().filter(|(_, t)| t == text).count()
    }

    pub fn clear(&self) {
        lock(&self.0).attempts.clear();
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, contact: &ContactRef, text: &str) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.0);
        state.attempts.push((contact.as_str().to_string(), text.to_string()));
        if let Some(flag) = &state.raise_on_send {
            flag.raise();
        }
        if state.failing.contains(&contact.normalized()) {
            return Err(CollaboratorError::Unavailable(format!("{contact} unreachable")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    reachable: BTreeSet<String>,
    failing: bool,
    polls: usize,
}

/// Directory with a settable reachable set.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory(Arc<Mutex<DirectoryState>>);

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_reachable(&self, contact: &str) {
        lock(&self.0).reachable.insert(normalize_contact(contact));
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }

    pub fn polls(&self) -> usize {
        lock(&self.0).polls
    }
}

impl ContactDirectory for StaticDirectory {
    fn list_reachable(&self) -> Result<BTreeSet<String>, CollaboratorError> {
        let mut state = lock(&self.0);
        state.polls += 1;
        if state.failing {
            return Err(CollaboratorError::Unavailable("directory offline".into()));
        }
        Ok(state.reachable.clone())
    }
}

#[derive(Debug, Default)]
struct IncidentState {
    recorded: Vec<Incident>,
    claimed: BTreeSet<(Uuid, u64)>,
    failing: bool,
}

/// Incident log kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryIncidents(Arc<Mutex<IncidentState>>);

impl MemoryIncidents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }

    /// Calls received, including duplicates.
    pub fn recorded(&self) -> Vec<Incident> {
        lock(&self.0).recorded.clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.0).recorded.len()
    }

    /// Distinct (session, cycle) pairs claimed so far.
    pub fn claims(&self) -> usize {
        lock(&self.0).claimed.len()
    }
}

impl IncidentStore for MemoryIncidents {
    fn claim(&self, incident: &Incident) -> Result<bool, CollaboratorError> {
        let mut state = lock(&self.0);
        if state.failing {
            return Err(CollaboratorError::Unavailable("incident store offline".into()));
        }
        Ok(state.claimed.insert((incident.session_id, incident.cycle)))
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.0);
        state.recorded.push(incident.clone());
        if state.failing {
            return Err(CollaboratorError::Unavailable("incident store offline".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AlarmState {
    scheduled: BTreeMap<AlarmSlot, (Timestamp, AlarmPayload)>,
    schedules: usize,
    cancels: usize,
    failing: bool,
}

/// Alarm table held in memory; supersedes by slot like a real one.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlarm(Arc<Mutex<AlarmState>>);

impl MemoryAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }

    pub fn scheduled(&self) -> BTreeMap<AlarmSlot, (Timestamp, AlarmPayload)> {
        lock(&self.0).scheduled.clone()
    }

    pub fn get(&self, slot: AlarmSlot) -> Option<(Timestamp, AlarmPayload)> {
        lock(&self.0).scheduled.get(&slot).copied()
    }

    pub fn schedule_calls(&self) -> usize {
        lock(&self.0).schedules
    }

    pub fn cancel_calls(&self) -> usize {
        lock(&self.0).cancels
    }

    /// Remove and return alarms whose fire time has passed.
    pub fn take_due(&self, now: Timestamp) -> Vec<AlarmPayload> {
        let mut state = lock(&self.0);
        let due: Vec<AlarmSlot> = state
            .scheduled
            .iter()
            .filter(|(_, (fire_at, _))| *fire_at <= now)
            .map(|(slot, _)| *slot)
            .collect();
        due.into_iter()
            .filter_map(|slot| state.scheduled.remove(&slot).map(|(_, p)| p))
            .collect()
    }
}

impl DurableAlarm for MemoryAlarm {
    fn schedule(
        &self,
        slot: AlarmSlot,
        fire_at: Timestamp,
        payload: &AlarmPayload,
    ) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.0);
        state.schedules += 1;
        if state.failing {
            return Err(CollaboratorError::Unavailable("alarm service offline".into()));
        }
        state.scheduled.insert(slot, (fire_at, *payload));
        Ok(())
    }

    fn cancel(&self, slot: AlarmSlot) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.0);
        state.cancels += 1;
        if state.failing {
            return Err(CollaboratorError::Unavailable("alarm service offline".into()));
        }
        state.scheduled.remove(&slot);
        Ok(())
    }
}

/// Fixed credential.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<Token>);

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self(Some(Token(token.to_string())))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl AuthSession for StaticToken {
    fn token(&self) -> Option<Token> {
        self.0.clone()
    }
}
