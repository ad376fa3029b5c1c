//! Composer operations, run through the process runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AddonConfig;
use crate::error::{AppError, Result};
use crate::process::{Program, ProcessExecutor, ProcessResult, RunOptions};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ComposerManager {
    executor: Arc<dyn ProcessExecutor>,
    composer_path: String,
    timeout: Duration,
}

impl ComposerManager {
    pub fn new(executor: Arc<dyn ProcessExecutor>, composer_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            composer_path: composer_path.into(),
            timeout,
        }
    }

    pub fn from_config(executor: Arc<dyn ProcessExecutor>, config: &AddonConfig) -> Self {
        Self::new(executor, config.composer_path.clone(), config.composer_timeout())
    }

    /// A `.phar` is run with the site's PHP; anything else is executed directly.
    pub fn program(&self, php: &Path) -> Program {
        let path = self.composer_path.trim();
        if path.is_empty() {
            Program::new("composer")
        } else if path.ends_with(".phar") {
            Program::script(php, PathBuf::from(path))
        } else {
            Program::new(path)
        }
    }

    fn options(&self, cwd: &Path, timeout: Duration) -> RunOptions {
        RunOptions::new(timeout)
            .cwd(cwd)
            .env("COMPOSER_NO_INTERACTION", "1")
    }

    /// Fails unless Composer answers `--version`.
    pub async fn check_version(&self, php: &Path, cwd: &Path) -> Result<String> {
        let result = self
            .executor
            .run(
                &self.program(php),
                &["--version".to_string()],
                &self.options(cwd, VERSION_CHECK_TIMEOUT).quiet(),
            )
            .await;
        if !result.success {
            return Err(AppError::install(format!(
                "Composer is not available ({}): {}",
                self.program(php).display_name(),
                result.tail(3)
            )));
        }
        let version = result.output.lines().next().unwrap_or("").trim().to_string();
        log::info!("Using {}", version);
        Ok(version)
    }

    /// `composer create-project laravel/laravel:^<major>.0 .` inside `app_dir`.
    pub async fn create_project(&self, php: &Path, app_dir: &Path, laravel_version: &str) -> ProcessResult {
        let args = vec![
            "create-project".to_string(),
            format!("laravel/laravel:^{}.0", laravel_version),
            ".".to_string(),
            "--prefer-dist".to_string(),
            "--no-interaction".to_string(),
        ];
        self.executor
            .run(&self.program(php), &args, &self.options(app_dir, self.timeout))
            .await
    }

    /// `composer require <package> --dev`, ignoring platform requirements
    /// because the site's PHP extensions are not visible to Composer here.
    pub async fn require_dev(&self, php: &Path, app_dir: &Path, package: &str) -> ProcessResult {
        let args = vec![
            "require".to_string(),
            package.to_string(),
            "--dev".to_string(),
            "--ignore-platform-reqs".to_string(),
            "--no-interaction".to_string(),
        ];
        self.executor
            .run(&self.program(php), &args, &self.options(app_dir, self.timeout))
            .await
    }
}
