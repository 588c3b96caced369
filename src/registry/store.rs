//! Session Registry Store
//!
//! The registry holds one row per logged-in user and is keyed by both user and
//! device: no two rows may share either field. Each operation is atomic; a
//! batch of changes passed to [`SessionRegistry::apply`] lands entirely or not
//! at all.

use super::types::{ActiveSession, RegistryChange, RegistrySnapshot};
use crate::error::SessionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Durable store of active sessions
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// The session for `user_name`, on any device
    async fn find_by_user(&self, user_name: &str) -> Result<Option<ActiveSession>, SessionError>;

    /// Another user occupying `device_token`
    async fn find_by_device_excluding_user(
        &self,
        device_token: &str,
        user_name: &str,
    ) -> Result<Option<ActiveSession>, SessionError>;

    /// The same user logged in on a device other than `device_token`.
    ///
    /// More than one such row is an `Inconsistent` error.
    async fn find_by_user_excluding_device(
        &self,
        user_name: &str,
        device_token: &str,
    ) -> Result<Option<ActiveSession>, SessionError>;

    /// Add a session; `Conflict` if the user or device already has one
    async fn insert(&self, session: ActiveSession) -> Result<(), SessionError>;

    /// Remove the session for (user, device); `NotLoggedIn` if absent
    async fn delete(&self, user_name: &str, device_token: &str) -> Result<(), SessionError>;

    /// Remove the session for (user, device) if it exists
    async fn force_evict(&self, user_name: &str, device_token: &str) -> Result<(), SessionError>;

    /// Apply a batch of changes atomically
    async fn apply(&self, changes: Vec<RegistryChange>) -> Result<(), SessionError>;

    /// All active sessions
    async fn list(&self) -> Result<Vec<ActiveSession>, SessionError>;
}

/// Session registry kept in memory and, when a path is configured, mirrored
/// to a JSON file after every committed change
pub struct FileSessionStore {
    path: Option<PathBuf>,
    rows: Mutex<Vec<ActiveSession>>,
}

impl FileSessionStore {
    /// A registry that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Open the registry at `path`, loading any sessions already recorded there
    pub async fn open(path: Option<PathBuf>) -> Result<Self, SessionError> {
        let Some(path) = path else {
            debug!("Session registry running in memory");
            return Ok(Self::in_memory());
        };

        let rows = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            let snapshot: RegistrySnapshot = serde_json::from_slice(&content)?;
            check_invariants(&snapshot.sessions)?;
            info!(
                "Loaded {} active sessions from {}",
                snapshot.sessions.len(),
                path.display()
            );
            snapshot.sessions
        } else {
            info!("No session registry at {}, starting empty", path.display());
            Vec::new()
        };

        Ok(Self {
            path: Some(path),
            rows: Mutex::new(rows),
        })
    }

    /// Location of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write `rows` to the backing file via a temp file and rename
    async fn persist(&self, rows: &[ActiveSession]) -> Result<(), SessionError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let snapshot = RegistrySnapshot {
            sessions: rows.to_vec(),
        };
        let content = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!("Persisted {} sessions to {}", rows.len(), path.display());
        Ok(())
    }
}

/// Apply `changes` to a copy of `rows`, leaving `rows` untouched on error
fn apply_changes(
    rows: &[ActiveSession],
    changes: &[RegistryChange],
) -> Result<Vec<ActiveSession>, SessionError> {
    let mut next = rows.to_vec();
    for change in changes {
        match change {
            RegistryChange::Evict {
                user_name,
                device_token,
            } => next.retain(|row| !row.is(user_name, device_token)),
            RegistryChange::Insert(session) => {
                if next.iter().any(|row| row.overlaps(session)) {
                    return Err(SessionError::conflict(
                        &session.user_name,
                        &session.device_token,
                    ));
                }
                next.push(session.clone());
            }
        }
    }
    Ok(next)
}

/// Reject row sets that share a user or a device between two rows
fn check_invariants(rows: &[ActiveSession]) -> Result<(), SessionError> {
    for (i, row) in rows.iter().enumerate() {
        if let Some(other) = rows[i + 1..].iter().find(|other| other.overlaps(row)) {
            return Err(SessionError::Inconsistent(format!(
                "sessions ({}, {}) and ({}, {}) share a user or device",
                row.user_name, row.device_token, other.user_name, other.device_token
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl SessionRegistry for FileSessionStore {
    async fn find_by_user(&self, user_name: &str) -> Result<Option<ActiveSession>, SessionError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.user_name == user_name).cloned())
    }

    async fn find_by_device_excluding_user(
        &self,
        device_token: &str,
        user_name: &str,
    ) -> Result<Option<ActiveSession>, SessionError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| row.device_token == device_token && row.user_name != user_name)
            .cloned())
    }

    async fn find_by_user_excluding_device(
        &self,
        user_name: &str,
        device_token: &str,
    ) -> Result<Option<ActiveSession>, SessionError> {
        let rows = self.rows.lock().await;
        let mut elsewhere = rows
            .iter()
            .filter(|row| row.user_name == user_name && row.device_token != device_token);

        let found = elsewhere.next().cloned();
        if elsewhere.next().is_some() {
            return Err(SessionError::Inconsistent(format!(
                "user '{}' is logged in on more than one other device",
                user_name
            )));
        }
        Ok(found)
    }

    async fn insert(&self, session: ActiveSession) -> Result<(), SessionError> {
        self.apply(vec![RegistryChange::Insert(session)]).await
    }

    async fn delete(&self, user_name: &str, device_token: &str) -> Result<(), SessionError> {
        let mut rows = self.rows.lock().await;
        if !rows.iter().any(|row| row.is(user_name, device_token)) {
            return Err(SessionError::not_logged_in(user_name, device_token));
        }

        let next: Vec<ActiveSession> = rows
            .iter()
            .filter(|row| !row.is(user_name, device_token))
            .cloned()
            .collect();
        self.persist(&next).await?;
        *rows = next;
        Ok(())
    }

    async fn force_evict(&self, user_name: &str, device_token: &str) -> Result<(), SessionError> {
        let mut rows = self.rows.lock().await;
        if !rows.iter().any(|row| row.is(user_name, device_token)) {
            return Ok(());
        }

        let next = apply_changes(
            &rows,
            &[RegistryChange::Evict {
                user_name: user_name.to_string(),
                device_token: device_token.to_string(),
            }],
        )?;
        self.persist(&next).await?;
        *rows = next;
        Ok(())
    }

    async fn apply(&self, changes: Vec<RegistryChange>) -> Result<(), SessionError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut rows = self.rows.lock().await;
        let next = apply_changes(&rows, &changes)?;
        if next == *rows {
            return Ok(());
        }
        self.persist(&next).await?;
        *rows = next;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ActiveSession>, SessionError> {
        Ok(self.rows.lock().await.clone())
    }
}
