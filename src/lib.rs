//! Session Gate Library
//!
//! Single-session-per-device login registry. A user may be logged in on one
//! device at a time and a device may host one user at a time. Conflicting
//! logins are refused with a warning the caller can accept to force the
//! override; hooks registered by other subsystems can reject a login, which
//! rolls the new session back.

pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod notifier;
pub mod registry;
pub mod session;

pub use config::Config;
pub use error::SessionError;
pub use session::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, SessionController, WarningKey,
};

/// Common error type for application plumbing
pub type Result<T> = anyhow::Result<T>;
