use clap::Subcommand;

use deadswitch_core::{Event, SwitchDriver};

use super::{print_event, print_events, CliResult, Host};

#[derive(Subcommand, Clone, Copy)]
pub enum SwitchAction {
    /// Print the current state as JSON
    Status,
    /// Check in: restore the full monitoring window
    Confirm,
    /// Stop an escalation that was triggered by mistake
    FalseAlarm,
    /// Begin a new cycle after a terminal one
    Restart,
    /// Ask the relay which contacts are reachable right now
    Poll,
    /// Destroy the session (contacts, deadlines, counters)
    Reset,
    /// Hold ticks and cadence; deadlines keep running
    Pause,
    /// Lift the pause and catch up
    Unpause,
}

pub fn run(action: SwitchAction) -> CliResult {
    let mut host = Host::open()?;
    let events = host.commit(|driver| apply(action, driver))?;

    if events.is_empty() {
        print_event(&host.driver.machine().snapshot())
    } else {
        print_events(&events)
    }
}

fn apply(action: SwitchAction, driver: &mut SwitchDriver) -> Vec<Event> {
    let now = driver.machine().now();
    let event = match action {
        SwitchAction::Status => None,
        SwitchAction::Confirm => driver.machine_mut().confirm_alive(),
        SwitchAction::FalseAlarm => driver.machine_mut().report_false_alarm(),
        SwitchAction::Restart => driver.machine_mut().restart(),
        SwitchAction::Poll => driver.poll_reachability(),
        SwitchAction::Reset => Some(driver.machine_mut().reset()),
        SwitchAction::Pause => return driver.set_paused(true, now),
        SwitchAction::Unpause => return driver.set_paused(false, now),
    };
    event.into_iter().collect()
}
