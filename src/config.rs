use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::paths::{
    config_path, default_php_runtime_dir, default_sites_file, default_sites_root, ensure_data_dir,
};
use crate::process::{ARTISAN_TIMEOUT, COMPOSER_TIMEOUT};

/// Addon configuration persisted as `config.toml` in the data directory.
pub struct ConfigStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
    cache: RwLock<Arc<AddonConfig>>,
}

fn load_config_from_disk(path: &Path) -> Result<AddonConfig> {
    if !path.exists() {
        return Ok(AddonConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|e| AppError::config(e.to_string()))?;
    toml::from_str(&content).map_err(|e| AppError::config(e.to_string()))
}

impl ConfigStore {
    /// Open (or create) the config in `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let config = load_config_from_disk(&config_path(&data_dir))?;
        let store = Self {
            data_dir,
            lock: Mutex::new(()),
            cache: RwLock::new(Arc::new(config)),
        };
        if !config_path(&store.data_dir).exists() {
            store.save_to_disk(&store.load())?;
        }
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn save_to_disk(&self, config: &AddonConfig) -> Result<()> {
        ensure_data_dir(&self.data_dir)?;
        let content =
            toml::to_string_pretty(config).map_err(|e| AppError::config(e.to_string()))?;
        fs::write(config_path(&self.data_dir), content).map_err(|e| AppError::config(e.to_string()))
    }

    pub fn load(&self) -> Arc<AddonConfig> {
        let config = self.cache.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&config)
    }

    /// Execute a read-modify-write operation on the config file while holding a lock.
    /// This prevents concurrent modifications from causing data loss.
    pub fn with_config_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut AddonConfig) -> Result<T>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut updated = (*self.load()).clone();
        let result = f(&mut updated)?;
        self.save_to_disk(&updated)?;

        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(updated);

        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonConfig {
    /// Bundled Composer executable or phar. Empty means `composer` on PATH.
    #[serde(default)]
    pub composer_path: String,
    /// PHP used when no site runtime can be resolved. Empty means `php` on PATH.
    #[serde(default)]
    pub php_binary: String,
    #[serde(default = "default_npm")]
    pub npm_binary: String,
    /// Editor command for "open in editor"; empty uses the platform default.
    #[serde(default)]
    pub editor: String,
    #[serde(default = "default_php_runtime_dir")]
    pub php_runtime_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_data_dir: Option<PathBuf>,
    #[serde(default = "default_sites_file")]
    pub sites_file: PathBuf,
    #[serde(default = "default_sites_root")]
    pub sites_root: PathBuf,
    #[serde(default = "default_composer_timeout")]
    pub composer_timeout_secs: u64,
    #[serde(default = "default_artisan_timeout")]
    pub artisan_timeout_secs: u64,
    #[serde(default = "default_db_ready_timeout")]
    pub db_ready_timeout_secs: u64,
    #[serde(default = "default_progress_retention")]
    pub progress_retention_secs: u64,
    #[serde(default)]
    pub command_history: Vec<String>,
}

fn default_npm() -> String {
    "npm".to_string()
}

fn default_composer_timeout() -> u64 {
    COMPOSER_TIMEOUT.as_secs()
}

fn default_artisan_timeout() -> u64 {
    ARTISAN_TIMEOUT.as_secs()
}

fn default_db_ready_timeout() -> u64 {
    30
}

fn default_progress_retention() -> u64 {
    30
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            composer_path: String::new(),
            php_binary: String::new(),
            npm_binary: default_npm(),
            editor: String::new(),
            php_runtime_dir: default_php_runtime_dir(),
            run_data_dir: None,
            sites_file: default_sites_file(),
            sites_root: default_sites_root(),
            composer_timeout_secs: default_composer_timeout(),
            artisan_timeout_secs: default_artisan_timeout(),
            db_ready_timeout_secs: default_db_ready_timeout(),
            progress_retention_secs: default_progress_retention(),
            command_history: Vec::new(),
        }
    }
}

impl AddonConfig {
    pub fn composer_timeout(&self) -> Duration {
        Duration::from_secs(self.composer_timeout_secs)
    }

    pub fn artisan_timeout(&self) -> Duration {
        Duration::from_secs(self.artisan_timeout_secs)
    }

    pub fn db_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.db_ready_timeout_secs)
    }

    pub fn progress_retention(&self) -> Duration {
        Duration::from_secs(self.progress_retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_writes_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::open(tmp.path()).unwrap();
        assert!(config_path(tmp.path()).exists());
        assert_eq!(store.load().artisan_timeout(), Duration::from_secs(120));
        assert_eq!(store.load().composer_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn mutations_persist_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::open(tmp.path()).unwrap();
        store
            .with_config_mut(|c| {
                c.composer_path = "/opt/composer.phar".to_string();
                c.command_history.push("migrate".to_string());
                Ok(())
            })
            .unwrap();

        let reopened = ConfigStore::open(tmp.path()).unwrap();
        let config = reopened.load();
        assert_eq!(config.composer_path, "/opt/composer.phar");
        assert_eq!(config.command_history, vec!["migrate".to_string()]);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), "artisan_timeout_secs = 5\n").unwrap();
        let store = ConfigStore::open(tmp.path()).unwrap();
        let config = store.load();
        assert_eq!(config.artisan_timeout_secs, 5);
        assert_eq!(config.npm_binary, "npm");
        assert_eq!(config.db_ready_timeout_secs, 30);
    }

    #[test]
    fn failed_mutation_leaves_config_unchanged() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::open(tmp.path()).unwrap();
        let before = store.load();
        let result: Result<()> = store.with_config_mut(|c| {
            c.editor = "code".to_string();
            Err(AppError::config("nope"))
        });
        assert!(result.is_err());
        assert_eq!(*store.load(), *before);
    }
}
