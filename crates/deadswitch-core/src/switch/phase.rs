use serde::{Deserialize, Serialize};

/// Phase of a session, ordered by escalation severity.
///
/// ```text
/// Setup -> Waiting -> Monitoring -> Escalating -> Terminal
///                        ^  |  ^         |           |
///                        |  +--+ confirm |           |
///                        +---------------+ false     |
///                        |                 alarm     |
///                        +---------------------------+ restart
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No contact registered.
    Setup,
    /// Contact registered, not yet confirmed reachable.
    Waiting,
    /// Check-in countdown running.
    Monitoring,
    /// Check-in missed; contacts are being notified on a cadence.
    Escalating,
    /// Escalation window elapsed; incident recorded.
    Terminal,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Waiting => "waiting",
            Phase::Monitoring => "monitoring",
            Phase::Escalating => "escalating",
            Phase::Terminal => "terminal",
        }
    }

    /// Phases that require at least one registered contact.
    pub fn requires_contact(self) -> bool {
        matches!(self, Phase::Waiting | Phase::Monitoring | Phase::Escalating)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_severity() {
        assert!(Phase::Setup < Phase::Waiting);
        assert!(Phase::Waiting < Phase::Monitoring);
        assert!(Phase::Monitoring < Phase::Escalating);
        assert!(Phase::Escalating < Phase::Terminal);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Escalating).unwrap(), "\"escalating\"");
        let p: Phase = serde_json::from_str("\"terminal\"").unwrap();
        assert_eq!(p, Phase::Terminal);
    }
}
