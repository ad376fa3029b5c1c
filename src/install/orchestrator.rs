//! Ordered Laravel site creation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::progress::ProgressCallback;
use super::types::{CreationProgress, InstallOptions, InstallStage, StarterKit};
use crate::artisan::SiteCommandRunner;
use crate::composer::ComposerManager;
use crate::config::AddonConfig;
use crate::env_file::{write_env_with_backup, EnvFile};
use crate::error::{AppError, Result};
use crate::paths::is_laravel_project;
use crate::php::resolve_php;
use crate::process::{Program, ProcessExecutor, ProcessResult, RunOptions};
use crate::site::{
    find_mysql_socket, SiteRecord, SiteRegistry, CREATED_AT_KEY, LARAVEL_VERSION_KEY,
    SITE_TYPE_KEY, SITE_TYPE_LARAVEL, STARTER_KIT_KEY,
};
use crate::validation::ensure_and_canonicalize_dir;

const DEFAULT_MYSQL_PORT: u16 = 3306;
const WRITABLE_DIRS: &[&str] = &["storage", "bootstrap/cache"];
const OUTPUT_TAIL_LINES: usize = 5;

pub struct InstallOrchestrator {
    executor: Arc<dyn ProcessExecutor>,
    registry: Arc<dyn SiteRegistry>,
    progress: ProgressCallback,
    config: Arc<AddonConfig>,
}

/// Turn a failed child process into a fatal install error.
fn require_success(step: &str, result: &ProcessResult, timeout_secs: u64) -> Result<()> {
    if result.success {
        return Ok(());
    }
    if result.is_timeout() {
        return Err(AppError::timeout(step, timeout_secs));
    }
    Err(AppError::install(format!(
        "{} failed (exit {}): {}",
        step,
        result.exit_code,
        result.tail(OUTPUT_TAIL_LINES)
    )))
}

/// Values written into a fresh project's `.env`.
pub fn laravel_env(site: &SiteRecord, socket: Option<&Path>) -> Vec<(&'static str, String)> {
    vec![
        ("APP_NAME", site.name.clone()),
        ("APP_ENV", "local".to_string()),
        ("APP_DEBUG", "true".to_string()),
        ("APP_URL", format!("http://{}", site.domain)),
        ("DB_CONNECTION", "mysql".to_string()),
        ("DB_HOST", "127.0.0.1".to_string()),
        (
            "DB_PORT",
            site.mysql_port().unwrap_or(DEFAULT_MYSQL_PORT).to_string(),
        ),
        ("DB_DATABASE", site.mysql.database.clone()),
        ("DB_USERNAME", site.mysql.user.clone()),
        ("DB_PASSWORD", site.mysql.password.clone()),
        (
            "DB_SOCKET",
            socket.map(|p| p.display().to_string()).unwrap_or_default(),
        ),
    ]
}

/// Starting point for `.env`: the existing file, the shipped example, or nothing.
fn base_env_content(app_dir: &Path) -> Result<String> {
    for name in [".env", ".env.example"] {
        let path = app_dir.join(name);
        if path.is_file() {
            return Ok(fs::read_to_string(&path)?);
        }
    }
    Ok(String::new())
}

/// Remove whatever the host put into the project directory so Composer gets
/// an empty target.
fn clear_placeholder(app_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(app_dir)? {
        let path = entry?.path();
        log::debug!("Removing placeholder {:?}", path);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_group_writable(dir: &Path) -> usize {
    use std::os::unix::fs::PermissionsExt as _;

    let mut failures = 0;
    for entry in walkdir::WalkDir::new(dir) {
        let result = entry
            .map_err(AppError::from)
            .and_then(|e| {
                fs::set_permissions(e.path(), fs::Permissions::from_mode(0o775))
                    .map_err(AppError::from)
            });
        if let Err(e) = result {
            log::warn!("Failed to set permissions under {:?}: {}", dir, e);
            failures += 1;
        }
    }
    failures
}

#[cfg(not(unix))]
fn make_group_writable(_dir: &Path) -> usize {
    0
}

impl InstallOrchestrator {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        registry: Arc<dyn SiteRegistry>,
        progress: ProgressCallback,
        config: Arc<AddonConfig>,
    ) -> Self {
        Self {
            executor,
            registry,
            progress,
            config,
        }
    }

    fn report(&self, site_id: &str, stage: InstallStage, message: &str) {
        log::info!("[{}] {}", site_id, message);
        (self.progress)(site_id, CreationProgress::at(stage, message));
    }

    fn report_step(&self, site_id: &str, progress: i32, message: &str) {
        log::info!("[{}] {}", site_id, message);
        (self.progress)(
            site_id,
            CreationProgress::with_progress(InstallStage::Finalizing, progress, message),
        );
    }

    /// Create the Laravel project for `site`, recording progress as it goes.
    ///
    /// Every fatal failure ends with an `Error` progress record before the
    /// error is returned.
    pub async fn run(&self, site: SiteRecord, options: InstallOptions) -> Result<()> {
        match self.install(&site, &options).await {
            Ok(()) => {
                self.report(&site.id, InstallStage::Complete, "Laravel site is ready");
                Ok(())
            }
            Err(e) => {
                log::error!("Site creation for {} failed: {}", site.id, e);
                (self.progress)(&site.id, CreationProgress::failed(e.user_message()));
                Err(e)
            }
        }
    }

    async fn install(&self, site: &SiteRecord, options: &InstallOptions) -> Result<()> {
        let artisan = SiteCommandRunner::new(Arc::clone(&self.executor), Arc::clone(&self.registry));
        let composer = ComposerManager::from_config(Arc::clone(&self.executor), &self.config);
        let composer_secs = self.config.composer_timeout_secs;
        let artisan_secs = self.config.artisan_timeout_secs;

        self.report(&site.id, InstallStage::Initializing, "Preparing site creation");
        self.registry.update_custom_options(
            &site.id,
            HashMap::from([
                (SITE_TYPE_KEY.to_string(), SITE_TYPE_LARAVEL.to_string()),
                (LARAVEL_VERSION_KEY.to_string(), options.laravel_version.clone()),
                (STARTER_KIT_KEY.to_string(), options.starter_kit.name().to_string()),
                (CREATED_AT_KEY.to_string(), chrono::Utc::now().to_rfc3339()),
            ]),
        )?;

        self.report(&site.id, InstallStage::Provisioning, "Preparing site directories");
        ensure_and_canonicalize_dir(site.root(), "site")?;
        let app_dir = ensure_and_canonicalize_dir(&site.app_dir(), "project")?;

        self.report(
            &site.id,
            InstallStage::InstallingDependencies,
            "Checking PHP and Composer",
        );
        let php = resolve_php(&self.config, site);
        composer.check_version(&php, &app_dir).await?;

        self.report(
            &site.id,
            InstallStage::CreatingProject,
            &format!("Creating Laravel {} project", options.laravel_version),
        );
        clear_placeholder(&app_dir)?;
        let result = composer
            .create_project(&php, &app_dir, &options.laravel_version)
            .await;
        require_success("composer create-project", &result, composer_secs)?;
        if !is_laravel_project(&app_dir) {
            return Err(AppError::install(
                "Composer finished but no Laravel project was created",
            ));
        }

        self.report(&site.id, InstallStage::ConfiguringEnv, "Configuring environment");
        self.configure_env(site, &app_dir)?;
        let result = artisan.artisan(&self.config, site, &args(&["key:generate", "--force"])).await;
        require_success("key:generate", &result, artisan_secs)?;

        self.report(&site.id, InstallStage::RunningMigrations, "Running database migrations");
        if !self
            .registry
            .wait_for_database(site, self.config.db_ready_timeout())
            .await
        {
            log::warn!(
                "Database for site {} not reachable after {}s, migrating anyway",
                site.id,
                self.config.db_ready_timeout_secs
            );
        }
        let result = artisan.artisan(&self.config, site, &args(&["migrate", "--force"])).await;
        require_success("migrate", &result, artisan_secs)?;

        self.report(&site.id, InstallStage::Finalizing, "Finalizing");
        if options.starter_kit != StarterKit::None {
            self.install_starter_kit(site, &options.starter_kit, &php, &app_dir, &artisan, &composer)
                .await?;
        }
        if options.build_assets {
            self.build_assets(site, &app_dir).await;
        }

        self.report_step(&site.id, 96, "Linking storage and fixing permissions");
        let result = artisan.artisan(&self.config, site, &args(&["storage:link"])).await;
        if !result.success {
            log::warn!("storage:link failed for {}: {}", site.id, result.tail(OUTPUT_TAIL_LINES));
        }
        for dir in WRITABLE_DIRS {
            let path = app_dir.join(dir);
            if path.exists() {
                make_group_writable(&path);
            }
        }

        Ok(())
    }

    fn configure_env(&self, site: &SiteRecord, app_dir: &Path) -> Result<()> {
        let run_dir = self.registry.run_data_dir();
        let socket: Option<PathBuf> = find_mysql_socket(&site.id, run_dir.as_deref());

        let mut env = EnvFile::parse(&base_env_content(app_dir)?);
        for (key, value) in laravel_env(site, socket.as_deref()) {
            env.set(key, &value);
        }
        write_env_with_backup(&app_dir.join(".env"), &env.to_string())
    }

    async fn install_starter_kit(
        &self,
        site: &SiteRecord,
        kit: &StarterKit,
        php: &Path,
        app_dir: &Path,
        artisan: &SiteCommandRunner,
        composer: &ComposerManager,
    ) -> Result<()> {
        let Some(package) = kit.package() else {
            return Ok(());
        };

        self.report_step(&site.id, 82, &format!("Installing {}", package));
        let result = composer.require_dev(php, app_dir, &package).await;
        require_success("composer require", &result, self.config.composer_timeout_secs)?;

        self.report_step(&site.id, 86, &format!("Scaffolding {} ({})", kit.name(), kit_stack(kit)));
        let install_args = kit.install_args();
        let result = artisan.artisan(&self.config, site, &install_args).await;
        require_success(&install_args[0], &result, self.config.artisan_timeout_secs)?;

        self.report_step(&site.id, 90, "Running starter kit migrations");
        let result = artisan.artisan(&self.config, site, &args(&["migrate", "--force"])).await;
        require_success("migrate", &result, self.config.artisan_timeout_secs)
    }

    /// `npm install` then `npm run build`. Failures only warn.
    async fn build_assets(&self, site: &SiteRecord, app_dir: &Path) {
        self.report_step(&site.id, 93, "Building frontend assets");
        let npm = Program::new(&self.config.npm_binary);
        let options = RunOptions::new(self.config.composer_timeout()).cwd(app_dir);

        for step in [args(&["install"]), args(&["run", "build"])] {
            let result = self.executor.run(&npm, &step, &options).await;
            if !result.success {
                log::warn!(
                    "npm {} failed for site {}, skipping asset build: {}",
                    step.join(" "),
                    site.id,
                    result.tail(OUTPUT_TAIL_LINES)
                );
                return;
            }
        }
    }
}

fn kit_stack(kit: &StarterKit) -> &str {
    match kit {
        StarterKit::None => "",
        StarterKit::Breeze { stack, .. } | StarterKit::Jetstream { stack, .. } => stack,
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
