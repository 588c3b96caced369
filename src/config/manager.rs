//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load the configuration file at `path`, with environment variables
    /// filling in any setting the file leaves out
    pub fn load(path: &Path) -> Result<Config> {
        let env = Self::env_config()?;
        if !path.exists() {
            tracing::warn!(
                "Configuration file not found at {}, using environment and defaults",
                path.display()
            );
            env.validate()?;
            return Ok(env);
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        let table: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let in_file = |section: &str, key: &str| {
            table
                .get(section)
                .and_then(|values| values.get(key))
                .is_some()
        };
        if !in_file("registry", "path") {
            config.registry.path = env.registry.path;
        }
        if !in_file("registry", "lock_timeout") {
            config.registry.lock_timeout = env.registry.lock_timeout;
        }
        if !in_file("notifier", "channel_capacity") {
            config.notifier.channel_capacity = env.notifier.channel_capacity;
        }
        if !in_file("logging", "level") {
            config.logging.level = env.logging.level;
        }

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let config = Self::env_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `SESSION_GATE_*` variables that are set
    fn env_config() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("SESSION_GATE_REGISTRY_PATH") {
            config.registry.path = Some(PathBuf::from(path));
        }

        if let Ok(timeout) = std::env::var("SESSION_GATE_LOCK_TIMEOUT") {
            config.registry.lock_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SESSION_GATE_LOCK_TIMEOUT: {}", timeout))?;
        }

        if let Ok(capacity) = std::env::var("SESSION_GATE_NOTIFIER_CAPACITY") {
            config.notifier.channel_capacity = capacity
                .parse::<usize>()
                .with_context(|| format!("Invalid SESSION_GATE_NOTIFIER_CAPACITY: {}", capacity))?;
        }

        if let Ok(log_level) = std::env::var("SESSION_GATE_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_registry_config()
            .with_context(|| "Registry configuration validation failed")?;

        self.validate_users()
            .with_context(|| "User configuration validation failed")?;

        self.validate_devices()
            .with_context(|| "Device configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_registry_config(&self) -> Result<()> {
        if self.registry.lock_timeout.is_zero() {
            bail!("registry.lock_timeout must be greater than 0");
        }

        if self.notifier.channel_capacity == 0 {
            bail!("notifier.channel_capacity must be greater than 0");
        }

        if let Some(path) = &self.registry.path {
            if path.as_os_str().is_empty() {
                bail!("registry.path must not be empty when set");
            }
        }

        Ok(())
    }

    fn validate_users(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for (i, user) in self.users.iter().enumerate() {
            if user.username.is_empty() {
                bail!("User {} has empty username", i);
            }

            if user.username.len() > 255 {
                bail!("User {} username exceeds 255 characters", i);
            }

            if !seen.insert(user.username.as_str()) {
                bail!("User '{}' is configured more than once", user.username);
            }

            match (&user.password, &user.password_hash, &user.salt) {
                (Some(password), None, _) => {
                    if password.is_empty() {
                        bail!("User '{}' has empty password", user.username);
                    }
                }
                (None, Some(hash), Some(_)) => {
                    if hash.is_empty() {
                        bail!("User '{}' has empty password_hash", user.username);
                    }
                }
                (None, Some(_), None) => {
                    bail!("User '{}' sets password_hash without salt", user.username);
                }
                (Some(_), Some(_), _) => {
                    bail!(
                        "User '{}' must set either password or password_hash, not both",
                        user.username
                    );
                }
                (None, None, _) => {
                    bail!("User '{}' has no password configured", user.username);
                }
            }
        }

        Ok(())
    }

    fn validate_devices(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for (i, device) in self.devices.iter().enumerate() {
            if device.token.is_empty() {
                bail!("Device {} has empty token", i);
            }

            if !seen.insert(device.token.as_str()) {
                bail!("Device '{}' is configured more than once", device.token);
            }
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, registry_path: Option<&Path>, log_level: Option<&str>) {
        if let Some(path) = registry_path {
            self.registry.path = Some(path.to_path_buf());
            tracing::info!("CLI override: registry path set to {}", path.display());
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
            tracing::info!("CLI override: log level set to {}", level);
        }
    }
}
