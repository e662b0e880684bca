//! Persisted launcher settings
//!
//! The overlay settings are stored with confy as TOML under the platform
//! config directory (`~/.config/veil/config.toml` on Linux,
//! `%APPDATA%\veil\config\config.toml` on Windows).

use std::path::PathBuf;

use thiserror::Error;
use veil_types::OverlaySettings;

const APP_NAME: &str = "veil";
const CONFIG_NAME: &str = "config";

/// Errors during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Load(#[from] confy::ConfyError),

    #[error("failed to save configuration")]
    Save(#[source] confy::ConfyError),
}

pub fn load() -> Result<OverlaySettings, ConfigError> {
    Ok(confy::load(APP_NAME, CONFIG_NAME)?)
}

/// Load the stored settings, falling back to defaults on any error.
pub fn load_or_default() -> OverlaySettings {
    match load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = ?e, "using default settings");
            OverlaySettings::default()
        }
    }
}

pub fn store(settings: &OverlaySettings) -> Result<(), ConfigError> {
    confy::store(APP_NAME, CONFIG_NAME, settings).map_err(ConfigError::Save)?;
    tracing::info!(path = ?path(), "settings saved");
    Ok(())
}

pub fn path() -> Option<PathBuf> {
    confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).ok()
}
