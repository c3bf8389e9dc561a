//! Bearer token kept in the OS keyring.

use tracing::warn;

use super::{AuthSession, Token};
use crate::error::Result;

const SERVICE: &str = "deadswitch";
const TOKEN_KEY: &str = "account_token";

/// Reads the token on every call so `auth logout` takes effect immediately.
#[derive(Debug, Clone, Default)]
pub struct KeyringAuth;

impl KeyringAuth {
    pub fn new() -> Self {
        Self
    }

    fn entry() -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(SERVICE, TOKEN_KEY)?)
    }

    /// # Errors
    /// Returns an error if the keyring is unavailable.
    pub fn get(&self) -> Result<Option<Token>> {
        match Self::entry()?.get_password() {
            Ok(pw) => Ok(Some(Token(pw))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, token: &str) -> Result<()> {
        Self::entry()?.set_password(token)?;
        Ok(())
    }

    /// Deleting an absent token succeeds.
    pub fn clear(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl AuthSession for KeyringAuth {
    fn token(&self) -> Option<Token> {
        match self.get() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "keyring unavailable");
                None
            }
        }
    }
}
