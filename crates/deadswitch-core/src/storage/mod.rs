mod config;
pub mod database;

pub use config::{AccountConfig, Config, MessagesConfig, RelayConfig, TimersConfig};
pub use config::{default_final_message, default_message_cycle};
pub use database::{Database, IncidentRow};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `DEADSWITCH_HOME` wins when set. Otherwise `~/.config/deadswitch[-dev]/`
/// depending on `DEADSWITCH_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("DEADSWITCH_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("DEADSWITCH_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("deadswitch-dev")
            } else {
                base_dir.join("deadswitch")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
