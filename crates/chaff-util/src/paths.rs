//! Default paths for chaffd components
//!
//! The configuration file defaults to a user-writable location:
//! `$XDG_CONFIG_HOME/chaffd/config.toml` or `~/.config/chaffd/config.toml`.

use std::path::PathBuf;

/// Environment variable for overriding the configuration file path
pub const CHAFFD_CONFIG_ENV: &str = "CHAFFD_CONFIG";

/// Configuration filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "chaffd";

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$CHAFFD_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/chaffd/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/chaffd/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CHAFFD_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the configuration path without checking CHAFFD_CONFIG.
fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    // Last resort
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
