//! Foreground host loop.
//!
//! The session is driven from a plain thread because the relay client is
//! blocking. The main thread only waits for signals and forwards them.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use chrono::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use deadswitch_core::Reconciliation;

use super::{print_events, CliResult, Host};

const MIN_WAIT_MS: i64 = 50;

enum Signal {
    /// The process was stopped and continued (SIGCONT).
    Resumed,
    Shutdown,
}

pub fn run() -> CliResult {
    let host = Host::open()?;
    let (signal_tx, signal_rx) = mpsc::channel();
    let (done_tx, done_rx) = oneshot::channel();

    let worker = thread::spawn(move || {
        let result = drive(host, signal_rx);
        let _ = done_tx.send(());
        result
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(forward_signals(signal_tx, done_rx));

    worker
        .join()
        .map_err(|_| "watch loop panicked")?
}

async fn forward_signals(tx: mpsc::Sender<Signal>, mut done: oneshot::Receiver<()>) {
    #[cfg(unix)]
    let mut sigcont =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::from_raw(sigcont_number())) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "SIGCONT handler unavailable");
                None
            }
        };

    loop {
        #[cfg(unix)]
        let continued = async {
            match sigcont.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending::<Option<()>>().await,
            }
        };
        #[cfg(not(unix))]
        let continued = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let _ = tx.send(Signal::Shutdown);
                break;
            }
            _ = continued => {
                if tx.send(Signal::Resumed).is_err() {
                    break;
                }
            }
            _ = &mut done => break,
        }
    }
}

/// tokio has no named kind for SIGCONT.
#[cfg(unix)]
fn sigcont_number() -> i32 {
    if cfg!(any(target_os = "macos", target_os = "ios", target_os = "freebsd")) {
        19
    } else {
        18
    }
}

fn drive(mut host: Host, signals: mpsc::Receiver<Signal>) -> CliResult {
    let floor = Duration::milliseconds(MIN_WAIT_MS);
    info!(phase = %host.driver.machine().phase(), "watching");

    loop {
        let now = host.now();
        let wait = host
            .driver
            .next_wait(now, floor)
            .to_std()
            .map_err(|e| format!("invalid wait: {e}"))?;
        let signal = signals.recv_timeout(wait);
        if matches!(signal, Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected)) {
            break;
        }
        // Commands run from other shells save through the same database.
        if let Err(e) = host.refresh() {
            warn!(error = %e, "session reload failed");
        }

        let events = match signal {
            Ok(Signal::Resumed) => {
                host.driver.suspend(now);
                let now = host.now();
                host.driver
                    .resume(now)
                    .and_then(|outcome| match outcome {
                        Reconciliation::Expired(event) => event,
                        _ => None,
                    })
                    .into_iter()
                    .collect()
            }
            _ => {
                let now = host.now();
                let mut events = host.driver.on_interval(now);
                for payload in host.db.due_alarms(now)? {
                    events.extend(host.driver.on_alarm(&payload, now));
                }
                events
            }
        };
        print_events(&events)?;
        if let Err(e) = host.save() {
            warn!(error = %e, "session save failed");
        }
    }

    host.save()
}
