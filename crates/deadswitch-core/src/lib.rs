//! # Deadswitch Core Library
//!
//! Core logic for a personal-safety dead-man's switch. The user registers
//! emergency contacts and must check in periodically; missing a check-in
//! starts a bounded escalation that messages every contact on a fixed
//! cadence, and ends in a single final alert plus a recorded incident.
//!
//! ## Architecture
//!
//! - **Switch**: A wall-clock-based state machine. It spawns no threads; the
//!   host calls `tick()` and friends, and every call is a guarded transition
//! - **Scheduler**: Tracks the one live deadline and mirrors it into a
//!   durable alarm that survives process suspension
//! - **Notifier**: Fan-out delivery, with a cancellation flag checked before
//!   every send
//! - **Reconciler / Driver**: Fast-forward after suspension and route every
//!   trigger source into the machine
//! - **Storage**: SQLite-backed session, incident log and alarms, plus TOML
//!   configuration
//!
//! ## Key Components
//!
//! - [`SwitchMachine`]: The state machine
//! - [`SwitchDriver`]: Host-facing trigger routing
//! - [`Database`]: Session, incident and alarm persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod collaborators;
pub mod driver;
pub mod error;
pub mod events;
pub mod memory;
pub mod notifier;
pub mod reachability;
pub mod reconciler;
pub mod scheduler;
pub mod storage;
pub mod switch;

pub use clock::{Clock, SystemClock, Timestamp};
pub use collaborators::{AlarmPayload, AlarmSlot, ContactRef, Incident};
pub use driver::SwitchDriver;
pub use error::{CollaboratorError, ConfigError, CoreError, DatabaseError};
pub use events::Event;
pub use notifier::{CancelFlag, MessageCycle};
pub use reachability::ReachabilityPoller;
pub use reconciler::{ForegroundReconciler, Reconciliation};
pub use storage::{Config, Database};
pub use switch::{Collaborators, Phase, Session, SwitchMachine, SwitchSettings};
