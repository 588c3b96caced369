//! Session Module
//!
//! The login/logout state machine and the request/response types it speaks.

pub mod controller;
pub mod types;

pub use controller::SessionController;
pub use types::{
    LoginRequest, LoginResponse, LoginStage, LogoutRequest, LogoutResponse, WarningKey,
};
