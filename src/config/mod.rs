//! Configuration module for Canary-RS
//!
//! Handles loading settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Load settings from an explicit file, the usual locations, or defaults.
///
/// `CANARY_*` environment variables are merged last.
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = match locate(explicit) {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            Settings::from_file(&path)
                .with_context(|| format!("invalid settings file {}", path.display()))?
        }
        None => {
            info!("No settings file found, using defaults");
            Settings::default()
        }
    };

    settings.merge_env();
    Ok(settings)
}

fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Environment variable takes precedence over default paths
    if let Ok(path) = std::env::var("CANARY_SETTINGS_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let mut paths = vec![
        PathBuf::from("canary.yml"),
        PathBuf::from("config/canary.yml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("canary-rs/canary.yml"));
    }

    paths.into_iter().find(|p| p.exists())
}
