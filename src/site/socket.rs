//! Locating the MySQL socket the host runs for a site.

use std::path::{Path, PathBuf};

/// Socket path under a host run-data directory.
pub fn socket_in_run_dir(run_dir: &Path, site_id: &str) -> PathBuf {
    run_dir.join(site_id).join("mysql").join("mysqld.sock")
}

/// Well-known run-data directories for this platform, in lookup order.
pub fn fallback_run_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    #[cfg(target_os = "macos")]
    if let Some(home) = dirs::home_dir() {
        candidates.push(
            home.join("Library")
                .join("Application Support")
                .join("Local")
                .join("run"),
        );
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(roaming) = dirs::config_dir() {
            candidates.push(roaming.join("Local").join("run"));
        }
        if let Some(local) = dirs::data_local_dir() {
            candidates.push(local.join("Local").join("run"));
        }
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        if let Some(config) = dirs::config_dir() {
            candidates.push(config.join("Local").join("run"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".config").join("Local").join("run"));
        }
    }

    candidates.dedup();
    candidates
}

/// Find the socket for `site_id`.
///
/// A host-provided run-data directory is checked first and is returned even
/// when the socket has not been created yet, because the database may still
/// be starting. Platform fallbacks are only returned when the file exists.
pub fn find_mysql_socket(site_id: &str, run_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(run_dir) = run_dir {
        return Some(socket_in_run_dir(run_dir, site_id));
    }
    fallback_run_dirs()
        .into_iter()
        .map(|dir| socket_in_run_dir(&dir, site_id))
        .find(|candidate| candidate.exists())
}
