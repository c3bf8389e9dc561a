use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "deadswitch", version, about = "Dead-man's switch CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emergency contact management
    Contact {
        #[command(subcommand)]
        action: commands::contact::ContactAction,
    },
    /// Check-in state machine control
    Switch {
        #[command(subcommand)]
        action: commands::switch::SwitchAction,
    },
    /// Run in the foreground, ticking until interrupted
    Watch,
    /// Deliver durable alarms that are due
    Wake,
    /// Recorded incidents
    Incidents {
        #[command(subcommand)]
        action: commands::incidents::IncidentsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Account credential management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
}

fn init_logging() {
    let filter = std::env::var("DEADSWITCH_LOG")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Contact { action } => commands::contact::run(action),
        Commands::Switch { action } => commands::switch::run(action),
        Commands::Watch => commands::watch::run(),
        Commands::Wake => commands::wake::run(),
        Commands::Incidents { action } => commands::incidents::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
