//! Session Gate - operator CLI
//!
//! Drives the login registry directly: log users in and out, list who is
//! logged in where, hash passwords for the configuration file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_gate::{
    auth::{generate_salt, hash_password},
    config::ConfigManager,
    Config, LoginRequest, LogoutRequest, SessionController,
};

/// CLI arguments for Session Gate
#[derive(Parser, Debug)]
#[command(name = "session-gate")]
#[command(about = "Session Gate - single-session-per-device login registry")]
#[command(version)]
#[command(long_about = "
Session Gate - single-session-per-device login registry

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SESSION_GATE_REGISTRY_PATH     - Registry file (e.g., /var/lib/session-gate/sessions.json)
  SESSION_GATE_LOCK_TIMEOUT      - Session lock timeout (e.g., 30s)
  SESSION_GATE_NOTIFIER_CAPACITY - Change notification buffer size
  SESSION_GATE_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "session-gate.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Registry file (overrides config file)
    #[arg(short, long, help = "Path to the session registry file")]
    pub registry: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log a user in to a device
    Login {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        device: String,
        /// Warning keys to accept (USER_ALREADY_LOGGED_ON, DEVICE_ALREADY_LOGGED_ON)
        #[arg(short, long = "accept")]
        accept: Vec<String>,
    },
    /// Log a user out of a device
    Logout {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        device: String,
    },
    /// List active sessions
    Sessions,
    /// Hash a password for the users section of the configuration
    HashPassword {
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        salt: Option<String>,
    },
    /// Validate configuration and exit
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(&args.config)?;

    config.merge_with_cli_args(args.registry.as_deref(), args.log_level.as_deref());
    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config)?;

    match args.command {
        Command::ValidateConfig => {
            info!("Configuration is valid");
            info!("Configuration summary:");
            info!(
                "  Registry: {}",
                config
                    .registry
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "in memory".to_string())
            );
            info!("  Lock timeout: {:?}", config.registry.lock_timeout);
            info!("  Users: {}", config.users.len());
            info!("  Devices: {}", config.devices.len());
            Ok(())
        }
        Command::HashPassword { password, salt } => {
            let salt = salt.unwrap_or_else(generate_salt);
            println!("password_hash = \"{}\"", hash_password(&password, &salt));
            println!("salt = \"{}\"", salt);
            Ok(())
        }
        Command::Sessions => {
            let controller = SessionController::from_config(&config).await?;
            print_json(&controller.sessions().await?)
        }
        Command::Login {
            user,
            password,
            device,
            accept,
        } => {
            let controller = SessionController::from_config(&config).await?;
            let mut request = LoginRequest::new(&user, &password, &device);
            request.accepted_warning_keys.extend(accept);

            let response = controller.login(request).await?;
            print_json(&response)?;
            if !response.succeeded {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Logout { user, device } => {
            let controller = SessionController::from_config(&config).await?;
            let response = controller
                .logout(LogoutRequest::new(&user, &device))
                .await?;
            print_json(&response)?;
            if !response.succeeded {
                std::process::exit(2);
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();

    Ok(())
}
