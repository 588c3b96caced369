//! Credential Verifier

use super::CredentialStore;
use crate::error::SessionError;
use std::sync::Arc;
use tracing::debug;

/// Checks supplied passwords against the credential store
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Verify credentials on a blocking worker so password stretching never
    /// stalls the async runtime.
    ///
    /// Returns `Ok(false)` for a wrong password and `UserNotFound` when no
    /// record exists for the user.
    pub async fn verify(&self, username: &str, password: &str) -> Result<bool, SessionError> {
        let verifier = self.clone();
        let username = username.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || verifier.verify_blocking(&username, &password)).await?
    }

    /// Synchronous form of [`CredentialVerifier::verify`]
    pub fn verify_blocking(&self, username: &str, password: &str) -> Result<bool, SessionError> {
        let record = self
            .store
            .credential_for(username)
            .ok_or_else(|| SessionError::UserNotFound(username.to_string()))?;

        if password.is_empty() {
            debug!(user = username, "empty password rejected");
            return Ok(false);
        }

        if !record.enabled {
            debug!(user = username, "user is disabled");
            return Ok(false);
        }

        Ok(record.verify_password(password))
    }
}
