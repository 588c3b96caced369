//! Registry Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user currently logged in to a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub user_name: String,
    pub device_token: String,
    pub login_time: DateTime<Utc>,
}

impl ActiveSession {
    /// Create a session that starts now
    pub fn new(user_name: &str, device_token: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            device_token: device_token.to_string(),
            login_time: Utc::now(),
        }
    }

    /// Whether this row belongs to the (user, device) pair
    pub fn is(&self, user_name: &str, device_token: &str) -> bool {
        self.user_name == user_name && self.device_token == device_token
    }

    /// Whether this row shares its user or its device with `other`
    pub fn overlaps(&self, other: &ActiveSession) -> bool {
        self.user_name == other.user_name || self.device_token == other.device_token
    }
}

/// A single mutation applied to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// Remove the row for (user, device) if present
    Evict {
        user_name: String,
        device_token: String,
    },
    /// Add a new row; fails if it overlaps an existing one
    Insert(ActiveSession),
}

/// On-disk form of the registry
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RegistrySnapshot {
    pub sessions: Vec<ActiveSession>,
}
