//! Hook Dispatcher
//!
//! Externally registered callbacks run at fixed points of the login and
//! logout sequence. Hooks run one at a time in registration order; the first
//! failure stops the remaining hooks.

use crate::session::{LoginResponse, LogoutResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback run after a new session is committed. An error rolls the login
/// back.
#[async_trait]
pub trait LoginHook: Send + Sync {
    async fn after_login(&self, response: &LoginResponse) -> anyhow::Result<()>;
}

/// Callback run before a session is removed. It may veto the logout by
/// marking the response failed.
#[async_trait]
pub trait LogoutHook: Send + Sync {
    async fn before_logout(&self, response: &mut LogoutResponse) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> LoginHook for F
where
    F: Fn(&LoginResponse) -> anyhow::Result<()> + Send + Sync,
{
    async fn after_login(&self, response: &LoginResponse) -> anyhow::Result<()> {
        (self)(response)
    }
}

#[async_trait]
impl<F> LogoutHook for F
where
    F: Fn(&mut LogoutResponse) -> anyhow::Result<()> + Send + Sync,
{
    async fn before_logout(&self, response: &mut LogoutResponse) -> anyhow::Result<()> {
        (self)(response)
    }
}

struct Registered<H: ?Sized> {
    name: String,
    hook: Arc<H>,
}

impl<H: ?Sized> Clone for Registered<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            hook: Arc::clone(&self.hook),
        }
    }
}

/// Ordered lists of login and logout hooks
#[derive(Default)]
pub struct HookRegistry {
    login_hooks: RwLock<Vec<Registered<dyn LoginHook>>>,
    logout_hooks: RwLock<Vec<Registered<dyn LogoutHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_login_hook<H>(&self, name: &str, hook: H)
    where
        H: LoginHook + 'static,
    {
        debug!("Registered login hook '{}'", name);
        self.login_hooks.write().push(Registered {
            name: name.to_string(),
            hook: Arc::new(hook),
        });
    }

    pub fn register_logout_hook<H>(&self, name: &str, hook: H)
    where
        H: LogoutHook + 'static,
    {
        debug!("Registered logout hook '{}'", name);
        self.logout_hooks.write().push(Registered {
            name: name.to_string(),
            hook: Arc::new(hook),
        });
    }

    pub fn login_hook_count(&self) -> usize {
        self.login_hooks.read().len()
    }

    pub fn logout_hook_count(&self) -> usize {
        self.logout_hooks.read().len()
    }

    /// Run every login hook; the first error aborts the rest and is returned
    /// unchanged
    pub async fn run_login_hooks(&self, response: &LoginResponse) -> anyhow::Result<()> {
        let hooks = self.login_hooks.read().clone();
        for registered in hooks {
            if let Err(e) = registered.hook.after_login(response).await {
                warn!(
                    user = %response.user_name,
                    "Login hook '{}' failed: {}", registered.name, e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run every logout hook; the first error aborts the rest and is returned
    /// unchanged
    pub async fn run_logout_hooks(&self, response: &mut LogoutResponse) -> anyhow::Result<()> {
        let hooks = self.logout_hooks.read().clone();
        for registered in hooks {
            if let Err(e) = registered.hook.before_logout(response).await {
                warn!(
                    user = %response.user_name,
                    "Logout hook '{}' failed: {}", registered.name, e
                );
                return Err(e);
            }
        }
        Ok(())
    }
}
