use tracing::debug;

use super::{print_events, CliResult, Host};

/// Deliver every durable alarm whose time has come.
///
/// Meant to be run by an OS scheduler (cron, launchd, systemd timer) so the
/// switch keeps firing while nothing else is running.
pub fn run() -> CliResult {
    let mut host = Host::open()?;
    let now = host.now();

    let due = host.db.due_alarms(now)?;
    debug!(count = due.len(), "due alarms");
    let events = host.commit(|driver| {
        due.iter()
            .filter_map(|payload| driver.on_alarm(payload, now))
            .collect::<Vec<_>>()
    })?;
    print_events(&events)
}
