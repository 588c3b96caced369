//! Registry Transaction
//!
//! Reads go straight to the registry; writes are staged and land together in
//! one atomic [`SessionRegistry::apply`] on commit. Dropping an uncommitted
//! transaction discards its staged writes.

use super::store::SessionRegistry;
use super::types::{ActiveSession, RegistryChange};
use crate::error::SessionError;
use tracing::debug;

pub struct RegistryTransaction<'a> {
    registry: &'a dyn SessionRegistry,
    staged: Vec<RegistryChange>,
}

impl<'a> RegistryTransaction<'a> {
    pub fn begin(registry: &'a dyn SessionRegistry) -> Self {
        Self {
            registry,
            staged: Vec::new(),
        }
    }

    fn is_evicted(&self, session: &ActiveSession) -> bool {
        self.staged.iter().any(|change| {
            matches!(change, RegistryChange::Evict { user_name, device_token }
                if session.is(user_name, device_token))
        })
    }

    fn visible(&self, found: Option<ActiveSession>) -> Option<ActiveSession> {
        found.filter(|session| !self.is_evicted(session))
    }

    pub async fn find_by_user(&self, user_name: &str) -> Result<Option<ActiveSession>, SessionError> {
        let found = self.registry.find_by_user(user_name).await?;
        Ok(self.visible(found))
    }

    pub async fn find_by_device_excluding_user(
        &self,
        device_token: &str,
        user_name: &str,
    ) -> Result<Option<ActiveSession>, SessionError> {
        let found = self
            .registry
            .find_by_device_excluding_user(device_token, user_name)
            .await?;
        Ok(self.visible(found))
    }

    pub async fn find_by_user_excluding_device(
        &self,
        user_name: &str,
        device_token: &str,
    ) -> Result<Option<ActiveSession>, SessionError> {
        let found = self
            .registry
            .find_by_user_excluding_device(user_name, device_token)
            .await?;
        Ok(self.visible(found))
    }

    /// Stage removal of the session for (user, device)
    pub fn force_evict(&mut self, user_name: &str, device_token: &str) {
        self.staged.push(RegistryChange::Evict {
            user_name: user_name.to_string(),
            device_token: device_token.to_string(),
        });
    }

    /// Stage a new session
    pub fn insert(&mut self, session: ActiveSession) {
        self.staged.push(RegistryChange::Insert(session));
    }

    /// Number of staged changes
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Apply every staged change atomically
    pub async fn commit(mut self) -> Result<(), SessionError> {
        let changes = std::mem::take(&mut self.staged);
        self.registry.apply(changes).await
    }
}

impl Drop for RegistryTransaction<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                "Discarding {} uncommitted registry changes",
                self.staged.len()
            );
        }
    }
}
