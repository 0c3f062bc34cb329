// src/main.rs

// Declare modules
pub mod config;
pub mod drm;
pub mod error;
pub mod modeset;
pub mod render;

use crate::{config::CONFIG, drm::Card, error::ModesetError};

use anyhow::Context;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for `kms-gradient`.
fn main() -> ExitCode {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting kms-gradient...");

    match run() {
        Ok(()) => {
            info!("kms-gradient exited successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}: {:#}", failure_summary(&e), e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run() -> anyhow::Result<()> {
    debug!(
        "Effective configuration: {}",
        serde_json::to_string(&*CONFIG).context("Failed to serialize configuration")?
    );

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| CONFIG.device.path.clone());

    // --- Device ---
    // Dropping `card` releases master and closes the node on every path out.
    let card = Card::open(&path)
        .with_context(|| format!("Failed to open DRM device '{}'", path.display()))?;
    info!("Using DRM device '{}'", card.path().display());

    // --- Outputs ---
    let mut registry = modeset::prepare(&card, CONFIG.framebuffer)
        .context("Failed to enumerate display outputs")?;
    if registry.is_empty() {
        warn!("No connector could be configured; nothing to show.");
    }

    let active = modeset::activate(&card, &mut registry);
    info!("{} of {} outputs active", active, registry.len());

    // --- Draw, then put everything back ---
    render::animate(&mut registry, &CONFIG.animation);
    modeset::cleanup(&card, &mut registry);

    Ok(())
}

fn failure_summary(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<ModesetError>() {
        Some(e) if e.is_fatal() => "Display device unusable",
        _ => "Modeset failed",
    }
}

/// Exit status for a fatal error: the OS error code behind it when there is
/// one, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ModesetError>()
        .map(ModesetError::exit_code)
        .unwrap_or(1)
}
