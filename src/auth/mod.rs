//! Authentication Module
//!
//! Credential records, the credential store and password verification.

pub mod types;
pub mod verifier;

pub use types::{generate_salt, hash_password, CredentialRecord, CredentialStore, UserStore};
pub use verifier::CredentialVerifier;
