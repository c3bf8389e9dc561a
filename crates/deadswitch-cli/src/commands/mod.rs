pub mod auth;
pub mod config;
pub mod contact;
pub mod incidents;
pub mod switch;
pub mod wake;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use deadswitch_core::collaborators::{AccountClient, FanoutIncidents, KeyringAuth, RelayClient};
use deadswitch_core::{
    Collaborators, Config, Database, DatabaseError, Event, ReachabilityPoller, Reconciliation,
    SwitchDriver, SwitchMachine, SystemClock,
};
use tracing::{debug, info};
use uuid::Uuid;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const LAST_SEEN_KEY: &str = "last_seen";
const COMMIT_ATTEMPTS: usize = 5;

/// The persisted session wired to its collaborators.
///
/// The process only runs for the duration of a command, so every open
/// starts suspended and is reconciled against the wall clock right away.
///
/// Several processes (a `watch`, a cron `wake`, one-off commands) may hold
/// the same session. Saves are compare-and-swap on the stored revision; the
/// loser reloads the winner's copy.
pub struct Host {
    pub db: Database,
    pub driver: SwitchDriver,
}

impl Host {
    pub fn open() -> CliResult<Self> {
        let config = Config::load()?;
        let db = Database::open()?;
        let driver = build_driver(&config, &db)?;
        let mut host = Self { db, driver };
        if let Some(event) = host.reconcile() {
            print_event(&event)?;
        }
        Ok(host)
    }

    fn reconcile(&mut self) -> Option<Event> {
        let now = self.driver.machine().now();
        match self.driver.resume(now)? {
            Reconciliation::Expired(event) => event,
            _ => None,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.driver.machine().now()
    }

    /// Take over the stored session if another process saved since we
    /// last loaded or saved. Returns whether anything was adopted.
    pub fn refresh(&mut self) -> CliResult<bool> {
        let stored = self.db.session_revision()?;
        if stored == self.driver.machine().session().revision() {
            return Ok(false);
        }
        match self.db.load_session()? {
            Some(session) => {
                self.driver.machine_mut().adopt(session);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save once. On a conflict the other writer wins and its copy is
    /// adopted instead.
    pub fn save(&mut self) -> CliResult {
        match self.db.save_session(self.driver.machine().session()) {
            Ok(revision) => self.driver.machine_mut().mark_persisted(revision),
            Err(DatabaseError::Conflict { expected, found }) => {
                info!(expected, found, "session changed elsewhere, reloading");
                self.refresh()?;
            }
            Err(e) => return Err(e.into()),
        }
        self.db.kv_set(LAST_SEEN_KEY, &self.now().to_rfc3339())?;
        Ok(())
    }

    /// Apply a change and save it. When another process saved in between,
    /// reload its copy and apply the change again on top of it.
    pub fn commit<T>(&mut self, mut apply: impl FnMut(&mut SwitchDriver) -> T) -> CliResult<T> {
        for attempt in 1..=COMMIT_ATTEMPTS {
            let output = apply(&mut self.driver);
            match self.db.save_session(self.driver.machine().session()) {
                Ok(revision) => {
                    self.driver.machine_mut().mark_persisted(revision);
                    self.db.kv_set(LAST_SEEN_KEY, &self.now().to_rfc3339())?;
                    return Ok(output);
                }
                Err(DatabaseError::Conflict { .. }) => {
                    debug!(attempt, "session changed elsewhere, retrying");
                    self.refresh()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err("session kept changing under this command; try again".into())
    }
}

fn build_driver(config: &Config, db: &Database) -> CliResult<SwitchDriver> {
    let settings = config.switch_settings()?;
    let relay_timeout = Duration::from_secs(config.relay.timeout_secs);

    let mut incidents = FanoutIncidents::new().with("local", Box::new(db.clone()));
    if config.account.report_incidents {
        let account = AccountClient::new(
            &config.account.base_url,
            Duration::from_secs(config.account.timeout_secs),
            Box::new(KeyringAuth::new()),
        )?;
        incidents = incidents.with("account", Box::new(account));
    }

    let collaborators = Collaborators {
        clock: Arc::new(SystemClock),
        sender: Box::new(RelayClient::new(&config.relay.base_url, relay_timeout)?),
        incidents: Box::new(incidents),
        alarm: Box::new(db.clone()),
    };
    let machine = match db.load_session()? {
        Some(session) => SwitchMachine::restore(session, settings, collaborators),
        None => SwitchMachine::new(Uuid::new_v4(), settings, collaborators),
    };

    let poller = ReachabilityPoller::new(
        Box::new(RelayClient::new(&config.relay.base_url, relay_timeout)?),
        config.reachability_poll_interval()?,
    );
    let since = db
        .kv_get(LAST_SEEN_KEY)?
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| machine.now());
    Ok(SwitchDriver::suspended(machine, Some(poller), since))
}

pub fn print_event(event: &Event) -> CliResult {
    println!("{}", serde_json::to_string_pretty(event)?);
    Ok(())
}

pub fn print_events(events: &[Event]) -> CliResult {
    for event in events {
        print_event(event)?;
    }
    Ok(())
}
