use clap::Subcommand;
use deadswitch_core::ContactRef;

use super::{print_event, CliResult, Host};

#[derive(Subcommand)]
pub enum ContactAction {
    /// Register an emergency contact
    Add {
        /// Relay username (a leading @ is ignored)
        name: String,
    },
    /// Unregister a contact
    Remove {
        name: String,
    },
    /// List registered contacts as JSON
    List,
}

pub fn run(action: ContactAction) -> CliResult {
    let mut host = Host::open()?;

    match action {
        ContactAction::Add { name } => {
            let contact = ContactRef::new(&name);
            if contact.is_empty() {
                return Err("contact name is empty".into());
            }
            match host.commit(|driver| driver.machine_mut().add_contact(contact.clone()))? {
                Some(event) => print_event(&event)?,
                None => eprintln!("already registered: {name}"),
            }
        }
        ContactAction::Remove { name } => {
            let contact = ContactRef::new(&name);
            match host.commit(|driver| driver.machine_mut().remove_contact(&contact))? {
                Some(event) => print_event(&event)?,
                None => return Err(format!("not registered: {name}").into()),
            }
        }
        ContactAction::List => {
            host.commit(|_| ())?;
            let session = host.driver.machine().session();
            let list: Vec<serde_json::Value> = session
                .contacts()
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "contact": c.as_str(),
                        "reachable": session.reachable().contains(c),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }
    Ok(())
}
