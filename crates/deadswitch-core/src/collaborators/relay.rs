//! HTTP message relay: delivers texts and lists reachable contacts.

use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{normalize_contact, ContactDirectory, ContactRef, MessageSender};
use crate::error::CollaboratorError;

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    users: Vec<String>,
}

pub struct RelayClient {
    base: Url,
    client: Client,
}

impl RelayClient {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollaboratorError> {
        let base = base_url_with_slash(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollaboratorError> {
        Ok(self.base.join(path)?)
    }
}

impl MessageSender for RelayClient {
    fn send(&self, contact: &ContactRef, text: &str) -> Result<(), CollaboratorError> {
        let body = json!({
            "target_username": contact.as_str(),
            "message": text,
        });
        let resp = self
            .client
            .post(self.endpoint("send-message")?)
            .json(&body)
            .send()?;

        let status = resp.status();
        // Error bodies are not always JSON; fall back to a failed response.
        let parsed: SendResponse = resp.json().unwrap_or(SendResponse {
            success: false,
            error: None,
        });
        if status.is_success() && parsed.success {
            Ok(())
        } else {
            Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message: parsed.error.unwrap_or_else(|| "delivery not confirmed".into()),
            })
        }
    }
}

impl ContactDirectory for RelayClient {
    fn list_reachable(&self) -> Result<BTreeSet<String>, CollaboratorError> {
        let resp = self.client.get(self.endpoint("users")?).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message: resp.text().unwrap_or_default(),
            });
        }
        let parsed: UsersResponse = resp.json()?;
        if !parsed.success {
            return Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message: "user listing not confirmed".into(),
            });
        }
        Ok(parsed.users.iter().map(|u| normalize_contact(u)).collect())
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
pub(crate) fn base_url_with_slash(raw: &str) -> Result<Url, CollaboratorError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
