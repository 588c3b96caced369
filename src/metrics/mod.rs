//! Metrics Module
//!
//! Prometheus counters for login/logout outcomes and a gauge of active
//! sessions.

use crate::Result;
use anyhow::Context;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Label values for the `outcome` dimension
pub mod outcome {
    pub const SUCCEEDED: &str = "succeeded";
    pub const IDEMPOTENT: &str = "idempotent";
    pub const WARNED: &str = "warned";
    pub const REJECTED: &str = "rejected";
    pub const ROLLED_BACK: &str = "rolled_back";
    pub const VETOED: &str = "vetoed";
    pub const BUSY: &str = "busy";
    pub const ERROR: &str = "error";
}

/// Collects and exports session metrics
pub struct SessionMetrics {
    registry: Registry,
    login_total: IntCounterVec,
    logout_total: IntCounterVec,
    active_sessions: IntGauge,
}

impl SessionMetrics {
    /// Create a new metrics collector with its own prometheus registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_total = IntCounterVec::new(
            Opts::new("session_gate_login_total", "Login attempts by outcome"),
            &["outcome"],
        )
        .context("Failed to create login counter")?;

        let logout_total = IntCounterVec::new(
            Opts::new("session_gate_logout_total", "Logout attempts by outcome"),
            &["outcome"],
        )
        .context("Failed to create logout counter")?;

        let active_sessions = IntGauge::new(
            "session_gate_active_sessions",
            "Number of sessions in the registry",
        )
        .context("Failed to create active sessions gauge")?;

        registry
            .register(Box::new(login_total.clone()))
            .context("Failed to register login counter")?;
        registry
            .register(Box::new(logout_total.clone()))
            .context("Failed to register logout counter")?;
        registry
            .register(Box::new(active_sessions.clone()))
            .context("Failed to register active sessions gauge")?;

        Ok(Self {
            registry,
            login_total,
            logout_total,
            active_sessions,
        })
    }

    pub fn record_login(&self, outcome: &str) {
        self.login_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_logout(&self, outcome: &str) {
        self.logout_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.set(count as i64);
    }

    pub fn login_count(&self, outcome: &str) -> u64 {
        self.login_total.with_label_values(&[outcome]).get()
    }

    pub fn logout_count(&self, outcome: &str) -> u64 {
        self.logout_total.with_label_values(&[outcome]).get()
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    /// Render all metrics in the prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .context("Failed to encode metrics")
    }
}
