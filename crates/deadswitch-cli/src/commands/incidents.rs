use clap::Subcommand;
use deadswitch_core::Database;

use super::CliResult;

#[derive(Subcommand)]
pub enum IncidentsAction {
    /// List recorded incidents, most recent first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: IncidentsAction) -> CliResult {
    let db = Database::open()?;
    match action {
        IncidentsAction::List { limit } => {
            let rows = db.incidents(limit)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}
