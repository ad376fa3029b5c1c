//! Centralized path utilities for the addon.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Get the root data directory for the addon (~/.laravel_local_addon).
#[allow(clippy::expect_used)]
pub fn get_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot find home directory");
    home.join(".laravel_local_addon")
}

/// Get the path to the config file inside a data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Ensure the data directory exists.
pub fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir).map_err(|e| AppError::io(e.to_string()))
}

/// Default root under which new sites are created (~/Local Sites).
pub fn default_sites_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join("Local Sites")
}

/// Default location of the host's site list.
pub fn default_sites_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join("Local")
        .join("sites.json")
}

/// Directory holding the host's bundled PHP runtimes, one subdirectory per version.
pub fn default_php_runtime_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join("Local")
        .join("lightning-services")
}

/// Get the PHP executable path within a runtime directory.
pub fn get_php_exe_path(runtime_dir: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        runtime_dir.join("php.exe")
    }

    #[cfg(not(target_os = "windows"))]
    {
        runtime_dir.join("bin").join("php")
    }
}

/// Get the Artisan script for a project directory.
pub fn get_artisan_path(app_dir: &Path) -> PathBuf {
    app_dir.join("artisan")
}

/// Check whether a directory holds a Laravel project.
pub fn is_laravel_project(app_dir: &Path) -> bool {
    get_artisan_path(app_dir).exists() && app_dir.join("composer.json").exists()
}
