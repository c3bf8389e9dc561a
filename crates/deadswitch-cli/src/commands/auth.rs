use clap::Subcommand;
use deadswitch_core::collaborators::KeyringAuth;

use super::{print_event, CliResult, Host};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the account service bearer token
    Login {
        #[arg(long)]
        token: String,
    },
    /// Remove the token and reset the session
    Logout,
    /// Check whether a token is stored
    Status,
}

pub fn run(action: AuthAction) -> CliResult {
    let auth = KeyringAuth::new();
    match action {
        AuthAction::Login { token } => {
            if token.trim().is_empty() {
                return Err("token is empty".into());
            }
            auth.set(token.trim())?;
            println!("logged in");
        }
        AuthAction::Logout => {
            auth.clear()?;
            let mut host = Host::open()?;
            let event = host.commit(|driver| driver.machine_mut().reset())?;
            print_event(&event)?;
        }
        AuthAction::Status => {
            let authenticated = auth.get()?.is_some();
            println!(
                "{}",
                serde_json::json!({ "authenticated": authenticated })
            );
        }
    }
    Ok(())
}
