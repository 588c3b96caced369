//! Login/Logout Controller
//!
//! A login walks VERIFYING -> RESOLVING_CONFLICTS -> COMMITTING ->
//! HOOK_RUNNING -> DONE. Conflict resolution and the commit run under the
//! user's and the device's locks, so no other attempt touching either can
//! interleave between the checks and the insert. The locks are held through
//! the login hooks too; a failing login hook deletes the session it just
//! created before anyone else can see it.
//! Every attempt, whatever its outcome, ends with one change notification.

use super::types::{
    LoginRequest, LoginResponse, LoginStage, LogoutRequest, LogoutResponse, WarningKey,
};
use crate::auth::{CredentialStore, CredentialVerifier, UserStore};
use crate::config::Config;
use crate::device::{DeviceApi, DeviceDirectory};
use crate::error::SessionError;
use crate::hooks::HookRegistry;
use crate::metrics::{outcome, SessionMetrics};
use crate::notifier::ChangeNotifier;
use crate::registry::{
    device_key, user_key, ActiveSession, FileSessionStore, KeyedGuard, KeyedLocks,
    RegistryTransaction, SessionRegistry,
};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates credential checks, registry changes, hooks and notifications
pub struct SessionController {
    verifier: CredentialVerifier,
    devices: Arc<dyn DeviceApi>,
    registry: Arc<dyn SessionRegistry>,
    hooks: Arc<HookRegistry>,
    notifier: ChangeNotifier,
    metrics: Option<Arc<SessionMetrics>>,
    locks: KeyedLocks,
    lock_timeout: Duration,
}

impl SessionController {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        devices: Arc<dyn DeviceApi>,
        registry: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            verifier: CredentialVerifier::new(credentials),
            devices,
            registry,
            hooks: Arc::new(HookRegistry::new()),
            notifier: ChangeNotifier::default(),
            metrics: None,
            locks: KeyedLocks::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Wire a controller from configuration: configured users and devices and
    /// the durable registry at `registry.path`
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let credentials = Arc::new(UserStore::from_config(&config.users)?);
        let devices = Arc::new(DeviceDirectory::from_config(&config.devices));
        let registry = FileSessionStore::open(config.registry.path.clone())
            .await
            .context("Failed to open session registry")?;
        let metrics = SessionMetrics::new()?;

        let controller = Self::new(credentials, devices, Arc::new(registry))
            .with_notifier(ChangeNotifier::new(config.notifier.channel_capacity))
            .with_lock_timeout(config.registry.lock_timeout)
            .with_metrics(Arc::new(metrics));
        controller.refresh_active_sessions().await;
        Ok(controller)
    }

    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn metrics(&self) -> Option<&Arc<SessionMetrics>> {
        self.metrics.as_ref()
    }

    /// The session `user_name` currently holds, if any
    pub async fn logged_in(&self, user_name: &str) -> Result<Option<ActiveSession>, SessionError> {
        self.registry.find_by_user(user_name).await
    }

    /// Every active session
    pub async fn sessions(&self) -> Result<Vec<ActiveSession>, SessionError> {
        self.registry.list().await
    }

    /// Log a user in to a device.
    ///
    /// Conflicts with another device or another user come back as an
    /// unsuccessful response carrying a [`WarningKey`]; resubmitting with the
    /// key accepted evicts the conflicting session.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, SessionError> {
        let result = self.login_attempt(&request).await;

        let label = match &result {
            Ok((_, label)) => *label,
            Err(
                SessionError::MissingDeviceToken
                | SessionError::UserNotFound(_)
                | SessionError::Authentication,
            ) => outcome::REJECTED,
            Err(SessionError::Hook { .. }) => outcome::ROLLED_BACK,
            Err(SessionError::SessionBusy { .. }) => outcome::BUSY,
            Err(e) => {
                error!(
                    user = %request.user_name,
                    device = %request.device_token,
                    stage = %LoginStage::Failed,
                    "Login failed: {}", e
                );
                outcome::ERROR
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_login(label);
        }

        self.notifier.notify(&request.user_name);
        result.map(|(response, _)| response)
    }

    async fn login_attempt(
        &self,
        request: &LoginRequest,
    ) -> Result<(LoginResponse, &'static str), SessionError> {
        let user = request.user_name.as_str();
        let device = request.device_token.as_str();

        debug!(user, device, stage = %LoginStage::Verifying, "Login attempt");
        if device.is_empty() {
            return Err(SessionError::MissingDeviceToken);
        }

        let this_description = self.describe(device).await?;

        if !self.verifier.verify(user, &request.password).await? {
            info!(user, device, "Login denied: bad credentials");
            return Err(SessionError::Authentication);
        }

        let mut response = LoginResponse::for_request(request);

        let guard = self.lock_session(user, device).await?;
        debug!(user, device, stage = %LoginStage::ResolvingConflicts, "Checking registry");
        let mut txn = RegistryTransaction::begin(self.registry.as_ref());

        let same_user = txn.find_by_user(user).await?;
        let elsewhere = txn.find_by_user_excluding_device(user, device).await?;
        let same_device = same_user.is_some() && elsewhere.is_none();

        // A row elsewhere is necessarily the user's one session, so the user
        // is active on a different device.
        if let Some(other) = &elsewhere {
            if request.accepts(WarningKey::UserAlreadyLoggedOn) {
                info!(
                    user, device,
                    "Evicting session on device {} (warning accepted)", other.device_token
                );
                txn.force_evict(&other.user_name, &other.device_token);
            } else {
                match self.describe(&other.device_token).await? {
                    Some(other_description) => {
                        info!(user, device, "Login refused: already logged in on {}", other_description);
                        let message = format!(
                            "User {} is already logged in, on device {}",
                            user, other_description
                        );
                        return Ok((
                            response.fail_with_warning(WarningKey::UserAlreadyLoggedOn, message),
                            outcome::WARNED,
                        ));
                    }
                    None => {
                        info!(
                            user, device,
                            "Evicting session on unenrolled device {}", other.device_token
                        );
                        txn.force_evict(&other.user_name, &other.device_token);
                    }
                }
            }
        }

        if same_device {
            debug!(user, device, "Already logged in to this device");
            response.device_description = this_description;
            response.succeeded = true;
            return Ok((response, outcome::IDEMPOTENT));
        }

        if let Some(occupant) = txn.find_by_device_excluding_user(device, user).await? {
            if request.accepts(WarningKey::DeviceAlreadyLoggedOn) {
                info!(
                    user, device,
                    "Evicting {} from this device (warning accepted)", occupant.user_name
                );
                txn.force_evict(&occupant.user_name, &occupant.device_token);
            } else {
                info!(user, device, "Login refused: device occupied by {}", occupant.user_name);
                let message = format!(
                    "User {} is currently logged into this device : {}",
                    occupant.user_name,
                    this_description.as_deref().unwrap_or(device)
                );
                return Ok((
                    response.fail_with_warning(WarningKey::DeviceAlreadyLoggedOn, message),
                    outcome::WARNED,
                ));
            }
        }

        debug!(user, device, stage = %LoginStage::Committing, "Creating session");
        txn.insert(ActiveSession::new(user, device));
        if let Err(e) = txn.commit().await {
            if matches!(e, SessionError::Conflict { .. }) {
                error!(user, device, "Session invariant violated despite conflict resolution");
            }
            return Err(e);
        }
        self.refresh_active_sessions().await;

        response.device_description = this_description;
        response.succeeded = true;

        // Locks stay held until the hooks settle; no other attempt may see a
        // session that can still be rolled back.
        debug!(user, device, stage = %LoginStage::HookRunning, "Running login hooks");
        if let Err(source) = self.hooks.run_login_hooks(&response).await {
            warn!(user, device, stage = %LoginStage::RolledBack, "Login hook failed, removing session");
            self.roll_back(user, device).await;
            drop(guard);
            return Err(SessionError::Hook { source });
        }
        drop(guard);

        info!(user, device, stage = %LoginStage::Done, "User logged in");
        Ok((response, outcome::SUCCEEDED))
    }

    /// Log a user out of a device.
    ///
    /// Logout hooks may veto the logout by failing the response; a vetoed
    /// logout leaves the session in place and is still returned as `Ok`.
    pub async fn logout(&self, request: LogoutRequest) -> Result<LogoutResponse, SessionError> {
        let result = self.logout_attempt(&request).await;

        let label = match &result {
            Ok((_, label)) => *label,
            Err(e) => {
                warn!(
                    user = %request.user_name,
                    device = %request.device_token,
                    "Logout failed: {}", e
                );
                outcome::ERROR
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_logout(label);
        }

        self.notifier.notify(&request.user_name);
        result.map(|(response, _)| response)
    }

    async fn logout_attempt(
        &self,
        request: &LogoutRequest,
    ) -> Result<(LogoutResponse, &'static str), SessionError> {
        let user = request.user_name.as_str();
        let device = request.device_token.as_str();

        let description = self.describe(device).await?;
        let mut response = LogoutResponse::for_request(request, description);

        if let Err(e) = self.hooks.run_logout_hooks(&mut response).await {
            response.add_error(&e.to_string());
        }

        if !response.succeeded {
            info!(user, device, "Logout vetoed by hooks");
            return Ok((response, outcome::VETOED));
        }

        self.registry.delete(user, device).await?;
        self.refresh_active_sessions().await;

        info!(user, device, "User logged out");
        Ok((response, outcome::SUCCEEDED))
    }

    async fn describe(&self, device_token: &str) -> Result<Option<String>, SessionError> {
        self.devices
            .device_description(device_token)
            .await
            .map_err(SessionError::Device)
    }

    async fn lock_session(&self, user: &str, device: &str) -> Result<KeyedGuard, SessionError> {
        tokio::time::timeout(
            self.lock_timeout,
            self.locks.acquire([user_key(user), device_key(device)]),
        )
        .await
        .map_err(|_| SessionError::SessionBusy {
            user_name: user.to_string(),
            device_token: device.to_string(),
            waited: self.lock_timeout,
        })
    }

    /// Remove the session a failed login created. A session that is already
    /// gone is fine; anything else is logged since the hook error is the one
    /// the caller sees.
    async fn roll_back(&self, user: &str, device: &str) {
        match self.registry.delete(user, device).await {
            Ok(()) | Err(SessionError::NotLoggedIn { .. }) => {}
            Err(e) => error!(user, device, "Failed to roll back session: {}", e),
        }
        self.refresh_active_sessions().await;
    }

    async fn refresh_active_sessions(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        match self.registry.list().await {
            Ok(sessions) => metrics.set_active_sessions(sessions.len()),
            Err(e) => debug!("Could not count active sessions: {}", e),
        }
    }
}
