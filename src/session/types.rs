//! Session Types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Conflict classes a caller can acknowledge to force an override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKey {
    /// The user is active on another device
    UserAlreadyLoggedOn,
    /// Another user is active on the requested device
    DeviceAlreadyLoggedOn,
}

impl WarningKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKey::UserAlreadyLoggedOn => "USER_ALREADY_LOGGED_ON",
            WarningKey::DeviceAlreadyLoggedOn => "DEVICE_ALREADY_LOGGED_ON",
        }
    }
}

impl fmt::Display for WarningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of a login attempt, reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Verifying,
    ResolvingConflicts,
    Committing,
    HookRunning,
    Done,
    Failed,
    RolledBack,
}

impl LoginStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStage::Verifying => "verifying",
            LoginStage::ResolvingConflicts => "resolving_conflicts",
            LoginStage::Committing => "committing",
            LoginStage::HookRunning => "hook_running",
            LoginStage::Done => "done",
            LoginStage::Failed => "failed",
            LoginStage::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login request submitted by a caller
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
    pub device_token: String,
    #[serde(default)]
    pub accepted_warning_keys: HashSet<String>,
}

impl LoginRequest {
    pub fn new(user_name: &str, password: &str, device_token: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            password: password.to_string(),
            device_token: device_token.to_string(),
            accepted_warning_keys: HashSet::new(),
        }
    }

    /// Acknowledge a warning so the matching conflict is overridden
    pub fn accept(mut self, key: WarningKey) -> Self {
        self.accepted_warning_keys.insert(key.as_str().to_string());
        self
    }

    pub fn accepts(&self, key: WarningKey) -> bool {
        self.accepted_warning_keys.contains(key.as_str())
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("device_token", &self.device_token)
            .field("accepted_warning_keys", &self.accepted_warning_keys)
            .finish()
    }
}

/// Outcome of a login attempt that did not raise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_name: String,
    pub device_token: String,
    pub device_description: Option<String>,
    pub succeeded: bool,
    pub warnings: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub accepted_warning_keys: HashSet<String>,
}

impl LoginResponse {
    pub(crate) fn for_request(request: &LoginRequest) -> Self {
        Self {
            user_name: request.user_name.clone(),
            device_token: request.device_token.clone(),
            device_description: None,
            succeeded: false,
            warnings: BTreeMap::new(),
            errors: Vec::new(),
            accepted_warning_keys: request.accepted_warning_keys.clone(),
        }
    }

    pub(crate) fn fail_with_warning(mut self, key: WarningKey, message: String) -> Self {
        self.succeeded = false;
        self.warnings.insert(key.as_str().to_string(), message);
        self
    }

    pub fn has_warning(&self, key: WarningKey) -> bool {
        self.warnings.contains_key(key.as_str())
    }
}

/// Logout request submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub user_name: String,
    pub device_token: String,
    #[serde(default)]
    pub accepted_warning_keys: HashSet<String>,
}

impl LogoutRequest {
    pub fn new(user_name: &str, device_token: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            device_token: device_token.to_string(),
            accepted_warning_keys: HashSet::new(),
        }
    }
}

/// Outcome of a logout attempt. Logout hooks receive it mutably and may fail
/// the logout by clearing `succeeded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub user_name: String,
    pub device_token: String,
    pub device_description: Option<String>,
    pub succeeded: bool,
    pub warnings: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub accepted_warning_keys: HashSet<String>,
}

impl LogoutResponse {
    pub(crate) fn for_request(request: &LogoutRequest, device_description: Option<String>) -> Self {
        Self {
            user_name: request.user_name.clone(),
            device_token: request.device_token.clone(),
            device_description,
            succeeded: true,
            warnings: BTreeMap::new(),
            errors: Vec::new(),
            accepted_warning_keys: request.accepted_warning_keys.clone(),
        }
    }

    /// Mark the logout failed with a warning the caller may acknowledge
    pub fn add_warning(&mut self, key: &str, message: &str) {
        self.succeeded = false;
        self.warnings.insert(key.to_string(), message.to_string());
    }

    /// Mark the logout failed with an error message
    pub fn add_error(&mut self, message: &str) {
        self.succeeded = false;
        self.errors.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepting_warnings() {
        let request = LoginRequest::new("alice", "pw", "d1").accept(WarningKey::UserAlreadyLoggedOn);
        assert!(request.accepts(WarningKey::UserAlreadyLoggedOn));
        assert!(!request.accepts(WarningKey::DeviceAlreadyLoggedOn));
    }

    #[test]
    fn test_password_is_not_logged() {
        let rendered = format!("{:?}", LoginRequest::new("alice", "hunter2", "d1"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_warning_key_wire_names() {
        assert_eq!(
            serde_json::to_string(&WarningKey::DeviceAlreadyLoggedOn).unwrap(),
            "\"DEVICE_ALREADY_LOGGED_ON\""
        );
        assert_eq!(WarningKey::UserAlreadyLoggedOn.to_string(), "USER_ALREADY_LOGGED_ON");
    }

    #[test]
    fn test_logout_hooks_can_fail_response() {
        let mut response = LogoutResponse::for_request(&LogoutRequest::new("alice", "d1"), None);
        assert!(response.succeeded);
        response.add_error("vehicle still assigned");
        assert!(!response.succeeded);
        assert_eq!(response.errors, vec!["vehicle still assigned".to_string()]);
    }
}
