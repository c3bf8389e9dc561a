//! Account service client. Records terminal incidents against the
//! authenticated user.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::relay::base_url_with_slash;
use super::{AuthSession, Incident, IncidentStore};
use crate::error::CollaboratorError;

pub struct AccountClient {
    base: Url,
    client: Client,
    auth: Box<dyn AuthSession>,
}

impl AccountClient {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        auth: Box<dyn AuthSession>,
    ) -> Result<Self, CollaboratorError> {
        let base = base_url_with_slash(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client, auth })
    }
}

impl IncidentStore for AccountClient {
    fn record_incident(&self, incident: &Incident) -> Result<(), CollaboratorError> {
        let token = self.auth.token().ok_or(CollaboratorError::NotAuthenticated)?;
        let resp = self
            .client
            .post(self.base.join("auth/increment-death")?)
            .bearer_auth(&token.0)
            .json(&json!({
                "session_id": incident.session_id,
                "cycle": incident.cycle,
                "at": incident.at,
            }))
            .send()?;

        let status = resp.status();
        if status.is_success() {
            debug!(cycle = incident.cycle, "incident reported to account service");
            Ok(())
        } else {
            Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message: resp.text().unwrap_or_default(),
            })
        }
    }
}
