//! Session Errors
//!
//! Error taxonomy for login and logout operations. Warning outcomes such as
//! a user already being logged on elsewhere are not errors; they come back as
//! unsuccessful responses carrying a warning key.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the session controller and its collaborators
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request carried no device token
    #[error("a device token must be supplied")]
    MissingDeviceToken,

    /// No credential record exists for the user
    #[error("user '{0}' not found")]
    UserNotFound(String),

    /// The password did not match the stored hash
    #[error("username or password is incorrect")]
    Authentication,

    /// An insert would have broken the one-user-per-device invariant
    #[error("session for user '{user_name}' on device '{device_token}' conflicts with an existing session")]
    Conflict {
        user_name: String,
        device_token: String,
    },

    /// No session exists for this user on this device
    #[error("user '{user_name}' is not logged in to device '{device_token}'")]
    NotLoggedIn {
        user_name: String,
        device_token: String,
    },

    /// A registered login hook rejected the login
    #[error("login hook failed: {source}")]
    Hook {
        #[source]
        source: anyhow::Error,
    },

    /// The registry holds data that breaks its own invariants
    #[error("session registry is inconsistent: {0}")]
    Inconsistent(String),

    /// The device directory could not be queried
    #[error("device lookup failed: {0}")]
    Device(#[source] anyhow::Error),

    /// Registry persistence failed
    #[error("session registry storage failed: {0}")]
    Storage(#[source] anyhow::Error),

    /// Another login held the user's or the device's lock for too long
    #[error("timed out after {waited:?} waiting for the session of '{user_name}' on '{device_token}'")]
    SessionBusy {
        user_name: String,
        device_token: String,
        waited: Duration,
    },

    /// A worker task failed
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether the error indicates a broken invariant or infrastructure fault
    /// that a caller must not retry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Conflict { .. }
                | SessionError::Inconsistent(_)
                | SessionError::Storage(_)
                | SessionError::Internal(_)
        )
    }

    pub(crate) fn not_logged_in(user_name: &str, device_token: &str) -> Self {
        SessionError::NotLoggedIn {
            user_name: user_name.to_string(),
            device_token: device_token.to_string(),
        }
    }

    pub(crate) fn conflict(user_name: &str, device_token: &str) -> Self {
        SessionError::Conflict {
            user_name: user_name.to_string(),
            device_token: device_token.to_string(),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Storage(err.into())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Storage(err.into())
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SessionError::Internal(format!("worker task failed: {}", err))
    }
}
