//! launchpilot - Automated game launching through an intermediary launcher
//!
//! Watches the intermediary client, the companion launcher and the game,
//! starts the client on demand or on a countdown, waits until the launcher
//! looks fully loaded, and auto-fills the stored account password.

#![allow(dead_code)] // Several API methods are part of a comprehensive public API

mod core;
mod platform;

use anyhow::Result;
use single_instance::SingleInstance;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{vault, App, Settings};

/// Application name constant
pub const APP_NAME: &str = "launchpilot";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("set-password") => {
            let Some(password) = args.get(1) else {
                eprintln!("Usage: {} set-password <password>", APP_NAME);
                std::process::exit(2);
            };
            let mut settings = Settings::load();
            settings.encrypted_password = Some(vault::encrypt(password));
            settings.save()?;
            println!("Password stored");
            Ok(())
        }
        Some("clear-password") => {
            let mut settings = Settings::load();
            settings.encrypted_password = None;
            settings.save()?;
            println!("Password cleared");
            Ok(())
        }
        Some("launch") => run(true).await,
        None => run(false).await,
        Some(other) => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: {} [launch | set-password <password> | clear-password]", APP_NAME);
            std::process::exit(2);
        }
    }
}

/// Run the coordinator, optionally kicking off a launch immediately.
async fn run(launch_now: bool) -> Result<()> {
    // Ensure only one instance of launchpilot itself is running
    let instance = SingleInstance::new(APP_NAME).expect("Failed to create single instance lock");
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        anyhow::bail!("{} is already running", APP_NAME);
    }

    let settings = Settings::load();
    info!(
        "Settings loaded (credential {}, auto-start {})",
        if settings.has_credential() {
            "stored"
        } else {
            "not stored"
        },
        if settings.auto_start_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let app = App::new(settings);
    if launch_now {
        if let Err(e) = app.start_launch() {
            error!("Immediate launch failed: {}", e);
        }
    }
    app.run().await
}

/// Initialize the logging system
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("launchpilot=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
