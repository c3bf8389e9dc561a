use tracing::warn;

use super::{Incident, IncidentStore};
use crate::error::CollaboratorError;

/// Records each incident to every store in turn.
///
/// Succeeds when at least one store accepted the record; the others are
/// logged. Fails with the last error when every store failed.
#[derive(Default)]
pub struct FanoutIncidents {
    stores: Vec<(&'static str, Box<dyn IncidentStore>)>,
}

impl FanoutIncidents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, store: Box<dyn IncidentStore>) -> Self {
        self.stores.push((name, store));
        self
    }
}

impl IncidentStore for FanoutIncidents {
    /// Refused as soon as one store refuses. A store that fails to answer
    /// does not block the claim.
    fn claim(&self, incident: &Incident) -> Result<bool, CollaboratorError> {
        for (name, store) in &self.stores {
            match store.claim(incident) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(e) => {
                    warn!(store = *name, cycle = incident.cycle, error = %e, "incident claim failed");
                }
            }
        }
        Ok(true)
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), CollaboratorError> {
        let mut accepted = false;
        let mut last_err = None;
        for (name, store) in &self.stores {
            match store.record_incident(incident) {
                Ok(()) => accepted = true,
                Err(e) => {
                    warn!(store = *name, cycle = incident.cycle, error = %e, "incident store failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !accepted => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryIncidents;
    use chrono::Utc;
    use uuid::Uuid;

    fn incident() -> Incident {
        Incident {
            session_id: Uuid::new_v4(),
            cycle: 1,
            at: Utc::now(),
        }
    }

    #[test]
    fn one_failing_store_does_not_block_the_other() {
        let local = MemoryIncidents::new();
        let remote = MemoryIncidents::new();
        remote.set_failing(true);
        let fanout = FanoutIncidents::new()
            .with("remote", Box::new(remote.clone()))
            .with("local", Box::new(local.clone()));

        fanout.record_incident(&incident()).unwrap();
        assert_eq!(local.count(), 1);
        assert_eq!(remote.count(), 0);
    }

    #[test]
    fn all_failing_is_an_error() {
        let remote = MemoryIncidents::new();
        remote.set_failing(true);
        let fanout = FanoutIncidents::new().with("remote", Box::new(remote));
        assert!(fanout.record_incident(&incident()).is_err());
    }

    #[test]
    fn claim_is_refused_when_any_store_refuses() {
        let local = MemoryIncidents::new();
        let remote = MemoryIncidents::new();
        remote.set_failing(true);
        let fanout = FanoutIncidents::new()
            .with("remote", Box::new(remote))
            .with("local", Box::new(local.clone()));

        let first = incident();
        assert!(fanout.claim(&first).unwrap());
        assert!(!fanout.claim(&first).unwrap());
        assert!(fanout.claim(&Incident { cycle: 2, ..first }).unwrap());
        assert_eq!(local.claims(), 2);
    }

    #[test]
    fn empty_fanout_accepts() {
        assert!(FanoutIncidents::new().record_incident(&incident()).is_ok());
    }
}
