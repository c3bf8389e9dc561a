//! Escalation notifier.
//!
//! Sends one message to every contact in order and counts deliveries. A shared
//! [`CancelFlag`] is checked before each send, so once the flag is raised at
//! most the send already in progress completes.

mod cadence;
mod messages;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::collaborators::{ContactRef, MessageSender};

pub use cadence::Cadence;
pub use messages::MessageCycle;

/// Cloneable stop signal shared between the machine and any thread that
/// wants to halt in-flight sends.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new(raised: bool) -> Self {
        Self(Arc::new(AtomicBool::new(raised)))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Notifier {
    sender: Box<dyn MessageSender>,
}

impl Notifier {
    pub fn new(sender: Box<dyn MessageSender>) -> Self {
        Self { sender }
    }

    /// Send `message` to each contact until `cancel` is observed.
    ///
    /// Returns the number of successful deliveries. Failures are logged and
    /// skipped.
    pub fn notify_all(&self, contacts: &[ContactRef], message: &str, cancel: &CancelFlag) -> u64 {
        let mut delivered = 0;
        for contact in contacts {
            if cancel.is_raised() {
                debug!(remaining = contacts.len(), "sending cancelled");
                break;
            }
            if self.deliver(contact, message) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send `message` to every contact regardless of cancellation. Used for
    /// the single terminal message.
    pub fn broadcast(&self, contacts: &[ContactRef], message: &str) -> u64 {
        contacts
            .iter()
            .filter(|contact| self.deliver(contact, message))
            .count() as u64
    }

    fn deliver(&self, contact: &ContactRef, message: &str) -> bool {
        match self.sender.send(contact, message) {
            Ok(()) => true,
            Err(e) => {
                warn!(contact = %contact, error = %e, "message delivery failed");
                false
            }
        }
    }
}
