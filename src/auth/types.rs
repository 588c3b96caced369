//! Credential Types

use crate::config::UserConfig;
use anyhow::bail;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Rounds of SHA-256 applied to salt and password
const HASH_ITERATIONS: u32 = 10_000;

/// Hash a password with the given salt.
///
/// Deterministic for a (password, salt) pair, so a record's stored hash can be
/// recomputed at verification time.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();

    for _ in 1..HASH_ITERATIONS {
        digest = Sha256::new()
            .chain_update(salt.as_bytes())
            .chain_update(digest)
            .finalize();
    }

    hex::encode(digest)
}

/// Generate a fresh random salt
pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Stored credentials for a single user
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub username: String,
    pub password_hash: String,
    pub salt: String,
    pub enabled: bool,
}

impl CredentialRecord {
    /// Create a record from a plaintext password, salting it freshly
    pub fn from_plaintext(username: String, password: &str, enabled: bool) -> Self {
        let salt = generate_salt();
        Self {
            username,
            password_hash: hash_password(password, &salt),
            salt,
            enabled,
        }
    }

    /// Verify a password against the stored hash
    pub fn verify_password(&self, password: &str) -> bool {
        self.password_hash == hash_password(password, &self.salt)
    }
}

/// Lookup of stored credentials by user name
pub trait CredentialStore: Send + Sync {
    /// The credential record for `username`, if one exists
    fn credential_for(&self, username: &str) -> Option<CredentialRecord>;
}

/// In-memory credential store loaded from configuration
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, CredentialRecord>>,
}

impl UserStore {
    /// Create a new empty user store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from the configured users
    pub fn from_config(users: &[UserConfig]) -> crate::Result<Self> {
        let store = Self::new();
        store.load_from_config(users)?;
        Ok(store)
    }

    /// Add or replace a user with a plaintext password
    pub fn add_user(&self, username: &str, password: &str, enabled: bool) {
        let record = CredentialRecord::from_plaintext(username.to_string(), password, enabled);
        self.users.write().insert(username.to_string(), record);
    }

    /// Add or replace a user from a prepared record
    pub fn insert_record(&self, record: CredentialRecord) {
        self.users.write().insert(record.username.clone(), record);
    }

    /// Remove a user
    pub fn remove_user(&self, username: &str) -> bool {
        self.users.write().remove(username).is_some()
    }

    /// Replace all users with the configured set
    pub fn load_from_config(&self, users: &[UserConfig]) -> crate::Result<()> {
        let mut loaded = HashMap::with_capacity(users.len());
        for user in users {
            let record = match (&user.password, &user.password_hash, &user.salt) {
                (Some(password), None, _) => {
                    CredentialRecord::from_plaintext(user.username.clone(), password, user.enabled)
                }
                (None, Some(hash), Some(salt)) => CredentialRecord {
                    username: user.username.clone(),
                    password_hash: hash.clone(),
                    salt: salt.clone(),
                    enabled: user.enabled,
                },
                _ => bail!("User '{}' has no usable password configuration", user.username),
            };
            loaded.insert(user.username.clone(), record);
        }

        *self.users.write() = loaded;
        Ok(())
    }

    /// Get all usernames
    pub fn usernames(&self) -> Vec<String> {
        self.users.read().keys().cloned().collect()
    }

    /// Check if user exists
    pub fn user_exists(&self, username: &str) -> bool {
        self.users.read().contains_key(username)
    }
}

impl CredentialStore for UserStore {
    fn credential_for(&self, username: &str) -> Option<CredentialRecord> {
        self.users.read().get(username).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_per_salt() {
        assert_eq!(hash_password("secret", "s1"), hash_password("secret", "s1"));
        assert_ne!(hash_password("secret", "s1"), hash_password("secret", "s2"));
        assert_ne!(hash_password("secret", "s1"), hash_password("Secret", "s1"));
    }

    #[test]
    fn test_record_verifies_own_password() {
        let record = CredentialRecord::from_plaintext("alice".into(), "wonderland", true);
        assert!(record.verify_password("wonderland"));
        assert!(!record.verify_password("looking-glass"));
    }

    #[test]
    fn test_load_prehashed_user() -> crate::Result<()> {
        let salt = "fixed-salt";
        let store = UserStore::from_config(&[UserConfig {
            username: "bob".into(),
            password: None,
            password_hash: Some(hash_password("builder", salt)),
            salt: Some(salt.into()),
            enabled: true,
        }])?;

        let record = store.credential_for("bob").expect("bob is configured");
        assert!(record.verify_password("builder"));
        assert!(store.user_exists("bob"));
        assert!(!store.user_exists("alice"));
        Ok(())
    }

    #[test]
    fn test_reload_replaces_users() -> crate::Result<()> {
        let store = UserStore::new();
        store.add_user("alice", "a", true);
        store.load_from_config(&[UserConfig {
            username: "carol".into(),
            password: Some("c".into()),
            password_hash: None,
            salt: None,
            enabled: true,
        }])?;
        assert_eq!(store.usernames(), vec!["carol".to_string()]);
        Ok(())
    }
}
