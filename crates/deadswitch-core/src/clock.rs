//! Wall-clock time source.
//!
//! Every remaining-time computation is `deadline - clock.now()`. Nothing in
//! the crate counts elapsed ticks; a missed tick only delays the observation
//! of an expiry, never shifts the deadline.

use chrono::{DateTime, Duration, Utc};

/// Absolute point in time used for deadlines.
pub type Timestamp = DateTime<Utc>;

/// Provider of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Whole seconds left until `deadline`, rounded up, floored at zero.
///
/// Matches what a countdown display shows: 4.2s left reads as "5".
pub fn remaining_secs(deadline: Timestamp, now: Timestamp) -> u64 {
    let ms = (deadline - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms + 999) / 1000) as u64
    }
}

/// `now + span`, saturating at the latest representable instant.
pub fn after(now: Timestamp, span: Duration) -> Timestamp {
    now.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_rounds_up_partial_seconds() {
        let now = Utc::now();
        assert_eq!(remaining_secs(now + Duration::milliseconds(4200), now), 5);
        assert_eq!(remaining_secs(now + Duration::seconds(5), now), 5);
        assert_eq!(remaining_secs(now + Duration::milliseconds(1), now), 1);
    }

    #[test]
    fn remaining_is_zero_at_and_after_deadline() {
        let now = Utc::now();
        assert_eq!(remaining_secs(now, now), 0);
        assert_eq!(remaining_secs(now - Duration::seconds(3), now), 0);
    }

    #[test]
    fn after_saturates_instead_of_overflowing() {
        let now = Utc::now();
        assert_eq!(after(now, Duration::seconds(5)), now + Duration::seconds(5));
        assert_eq!(after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
