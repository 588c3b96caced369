//! Session Registry Module
//!
//! The durable "currently logged in" registry, its transactions and the
//! per-user/per-device locks that serialize conflicting logins.

pub mod locks;
pub mod store;
pub mod transaction;
pub mod types;

pub use locks::{device_key, user_key, KeyedGuard, KeyedLocks};
pub use store::{FileSessionStore, SessionRegistry};
pub use transaction::RegistryTransaction;
pub use types::{ActiveSession, RegistryChange};
