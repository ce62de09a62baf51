//! Configuration file locations

use std::path::PathBuf;

/// Platform config directory for the module firmware
///
/// Falls back to the working directory when the platform exposes no
/// config dir (containers, stripped-down images).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("calyx")
}

/// Default location of the rack configuration file
pub fn config_file() -> PathBuf {
    config_dir().join("rack.yaml")
}
