//! Deadline scheduler.
//!
//! Owns the single authoritative deadline of the live phase. It mirrors that
//! deadline into a [`DurableAlarm`] so expiry is noticed even while the host is
//! suspended, and tells the host when the next foreground tick is due.
//!
//! Arming always cancels the slot first and then schedules it, and clears the
//! other slot, so at most one wake is ever outstanding.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{after, remaining_secs, Timestamp};
use crate::collaborators::{AlarmPayload, AlarmSlot, DurableAlarm};
use crate::switch::Phase;

/// The deadline currently backing a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedDeadline {
    pub slot: AlarmSlot,
    pub phase: Phase,
    pub deadline: Timestamp,
}

impl ArmedDeadline {
    pub fn remaining_secs(&self, now: Timestamp) -> u64 {
        remaining_secs(self.deadline, now)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.deadline <= now
    }
}

pub struct DeadlineScheduler {
    alarm: Box<dyn DurableAlarm>,
    armed: Option<ArmedDeadline>,
    tick_interval: Duration,
}

impl DeadlineScheduler {
    pub fn new(alarm: Box<dyn DurableAlarm>, tick_interval: Duration) -> Self {
        Self {
            alarm,
            armed: None,
            tick_interval,
        }
    }

    pub fn armed(&self) -> Option<ArmedDeadline> {
        self.armed
    }

    /// Arm `phase`'s slot for `deadline`, superseding whatever was armed.
    ///
    /// Phases without a deadline disarm everything instead.
    pub fn arm(&mut self, phase: Phase, deadline: Timestamp) {
        let Some(slot) = AlarmSlot::for_phase(phase) else {
            self.disarm_all();
            return;
        };

        if let Some(previous) = self.armed.take() {
            if previous.slot != slot {
                self.cancel_slot(previous.slot);
            }
        }
        self.cancel_slot(slot);

        let payload = AlarmPayload { phase, deadline };
        if let Err(e) = self.alarm.schedule(slot, deadline, &payload) {
            // The foreground tick still observes the deadline.
            warn!(slot = slot.id(), error = %e, "durable alarm schedule failed");
        }
        debug!(slot = slot.id(), %deadline, "deadline armed");
        self.armed = Some(ArmedDeadline {
            slot,
            phase,
            deadline,
        });
    }

    /// Cancel every slot and forget the armed deadline.
    pub fn disarm_all(&mut self) {
        self.armed = None;
        self.cancel_slot(AlarmSlot::MonitoringExpiry);
        self.cancel_slot(AlarmSlot::EscalationExpiry);
    }

    /// When the host should call `tick` next: one interval from `now`, or the
    /// deadline itself if that comes first.
    pub fn next_tick_at(&self, now: Timestamp) -> Option<Timestamp> {
        self.armed
            .map(|armed| std::cmp::min(after(now, self.tick_interval), armed.deadline.max(now)))
    }

    fn cancel_slot(&self, slot: AlarmSlot) {
        if let Err(e) = self.alarm.cancel(slot) {
            warn!(slot = slot.id(), error = %e, "durable alarm cancel failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAlarm;
    use chrono::Utc;

    fn scheduler() -> (DeadlineScheduler, MemoryAlarm) {
        let alarm = MemoryAlarm::new();
        (
            DeadlineScheduler::new(Box::new(alarm.clone()), Duration::seconds(1)),
            alarm,
        )
    }

    #[test]
    fn rearm_supersedes_same_slot() {
        let (mut s, alarm) = scheduler();
        let t0 = Utc::now();
        s.arm(Phase::Monitoring, t0 + Duration::seconds(5));
        s.arm(Phase::Monitoring, t0 + Duration::seconds(9));

        let scheduled = alarm.scheduled();
        assert_eq!(scheduled.len(), 1);
        let (fire_at, payload) = scheduled[&AlarmSlot::MonitoringExpiry];
        assert_eq!(fire_at, t0 + Duration::seconds(9));
        assert_eq!(payload.phase, Phase::Monitoring);
    }

    #[test]
    fn switching_phase_clears_other_slot() {
        let (mut s, alarm) = scheduler();
        let t0 = Utc::now();
        s.arm(Phase::Monitoring, t0 + Duration::seconds(5));
        s.arm(Phase::Escalating, t0 + Duration::seconds(25));

        let scheduled = alarm.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled.contains_key(&AlarmSlot::EscalationExpiry));
        assert_eq!(s.armed().unwrap().phase, Phase::Escalating);
    }

    #[test]
    fn disarm_all_cancels_everything() {
        let (mut s, alarm) = scheduler();
        s.arm(Phase::Escalating, Utc::now());
        s.disarm_all();
        assert!(alarm.scheduled().is_empty());
        assert!(s.armed().is_none());
    }

    #[test]
    fn alarm_failure_keeps_foreground_deadline() {
        let (mut s, alarm) = scheduler();
        alarm.set_failing(true);
        let deadline = Utc::now() + Duration::seconds(5);
        s.arm(Phase::Monitoring, deadline);
        assert_eq!(s.armed().unwrap().deadline, deadline);
    }

    #[test]
    fn next_tick_never_overshoots_deadline() {
        let (mut s, _) = scheduler();
        let t0 = Utc::now();
        assert!(s.next_tick_at(t0).is_none());

        s.arm(Phase::Monitoring, t0 + Duration::milliseconds(300));
        assert_eq!(s.next_tick_at(t0), Some(t0 + Duration::milliseconds(300)));

        s.arm(Phase::Monitoring, t0 + Duration::seconds(5));
        assert_eq!(s.next_tick_at(t0), Some(t0 + Duration::seconds(1)));
    }
}
