use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::artisan::SiteCommandRunner;
use crate::config::ConfigStore;
use crate::env_file::EnvFile;
use crate::error::Result;
use crate::history;
use crate::inspect::{self, EnvSnapshot, FailedJob, LogTail, QueueActionResponse};
use crate::install::{CreationProgress, InstallOptions, InstallOrchestrator, ProgressStore};
use crate::launch::{self, LaunchTarget};
use crate::process::{ProcessExecutor, ProcessResult, ProcessRunner};
use crate::site::{
    JsonSiteRegistry, NewSite, SiteRecord, SiteRegistry, CREATED_AT_KEY, LARAVEL_VERSION_KEY,
    STARTER_KIT_KEY,
};
use crate::validation::{
    resolve_within_root, CommandRequest, CreateSiteRequest, LogsRequest, QueueJobRequest,
    SiteRequest, UpdateEnvRequest, Validate,
};

/// Everything the handlers share. Owned by the bridge, never global.
pub struct AddonState {
    pub config: Arc<ConfigStore>,
    pub registry: Arc<dyn SiteRegistry>,
    pub executor: Arc<dyn ProcessExecutor>,
    pub progress: Arc<ProgressStore>,
}

impl AddonState {
    pub fn new(
        config: Arc<ConfigStore>,
        registry: Arc<dyn SiteRegistry>,
        executor: Arc<dyn ProcessExecutor>,
    ) -> Self {
        let retention = config.load().progress_retention();
        Self {
            config,
            registry,
            executor,
            progress: Arc::new(ProgressStore::new(retention)),
        }
    }

    /// Config from `data_dir`, the JSON site registry it points at and the
    /// real process runner.
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = Arc::new(ConfigStore::open(data_dir)?);
        let snapshot = config.load();
        let registry = Arc::new(JsonSiteRegistry::new(
            snapshot.sites_file.clone(),
            snapshot.sites_root.clone(),
            snapshot.run_data_dir.clone(),
        ));
        log::info!(
            "Addon state ready (data dir {:?}, sites file {:?})",
            config.data_dir(),
            snapshot.sites_file
        );
        Ok(Self::new(config, registry, Arc::new(ProcessRunner::new())))
    }

    pub fn site_runner(&self) -> SiteCommandRunner {
        SiteCommandRunner::new(Arc::clone(&self.executor), Arc::clone(&self.registry))
    }
}

// === Site creation ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteResponse {
    pub success: bool,
    pub site_id: String,
}

/// Validate, register the site with the host and start creation in the
/// background. Progress is read through [`get_creation_status`].
pub fn create_site(state: &AddonState, request: CreateSiteRequest) -> Result<CreateSiteResponse> {
    let options = InstallOptions::from_request(&request)?;
    let site = state.registry.add_site(&NewSite {
        name: request.name.trim().to_string(),
        domain: request.domain.clone(),
        php_version: options.php_version.clone(),
    })?;
    let site_id = site.id.clone();

    state.progress.update(&site_id, CreationProgress::default());
    let orchestrator = InstallOrchestrator::new(
        Arc::clone(&state.executor),
        Arc::clone(&state.registry),
        state.progress.callback(),
        state.config.load(),
    );
    tokio::spawn(async move {
        // Failures are already recorded in the progress store.
        let _ = orchestrator.run(site, options).await;
    });

    Ok(CreateSiteResponse {
        success: true,
        site_id,
    })
}

pub fn get_creation_status(state: &AddonState, request: &SiteRequest) -> Result<CreationProgress> {
    request.validate()?;
    Ok(state.progress.get(&request.site_id))
}

// === Sites ===

pub fn is_laravel_site(state: &AddonState, request: &SiteRequest) -> Result<bool> {
    request.validate()?;
    Ok(state
        .registry
        .get_site(&request.site_id)?
        .is_some_and(|site| site.is_laravel()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub path: PathBuf,
    pub is_laravel: bool,
    pub laravel_version: Option<String>,
}

pub fn get_sites(state: &AddonState) -> Result<Vec<SiteSummary>> {
    Ok(state
        .registry
        .list_sites()?
        .into_iter()
        .map(|site| SiteSummary {
            is_laravel: site.is_laravel(),
            laravel_version: site.custom(LARAVEL_VERSION_KEY).map(str::to_string),
            id: site.id,
            name: site.name,
            domain: site.domain,
            path: site.path,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub path: PathBuf,
    pub app_path: PathBuf,
    pub php_version: Option<String>,
    /// Requested major version.
    pub laravel_version: Option<String>,
    /// Version Composer actually installed.
    pub framework_version: Option<String>,
    pub starter_kit: Option<String>,
    pub created_at: Option<String>,
    pub app_env: Option<String>,
    pub app_debug: Option<String>,
    pub app_url: Option<String>,
}

/// `laravel/framework` version from `composer.lock`.
pub fn installed_framework_version(app_dir: &Path) -> Option<String> {
    let content = fs::read_to_string(app_dir.join("composer.lock")).ok()?;
    let lock: serde_json::Value = serde_json::from_str(&content).ok()?;
    lock.get("packages")?
        .as_array()?
        .iter()
        .find(|p| p.get("name").and_then(|n| n.as_str()) == Some("laravel/framework"))?
        .get("version")?
        .as_str()
        .map(|v| v.trim_start_matches('v').to_string())
}

pub fn get_info(state: &AddonState, request: &SiteRequest) -> Result<SiteInfo> {
    request.validate()?;
    let site = state.site_runner().laravel_site(&request.site_id)?;
    let env = EnvFile::parse(&crate::env_file::read_env(&site.env_path())?);
    let env_value = |key: &str| env.get(key).map(str::to_string);
    let custom = |key: &str| site.custom(key).map(str::to_string);

    Ok(SiteInfo {
        app_path: site.app_dir(),
        php_version: site.php_version().map(str::to_string),
        laravel_version: custom(LARAVEL_VERSION_KEY),
        framework_version: installed_framework_version(&site.app_dir()),
        starter_kit: custom(STARTER_KIT_KEY),
        created_at: custom(CREATED_AT_KEY),
        app_env: env_value("APP_ENV"),
        app_debug: env_value("APP_DEBUG"),
        app_url: env_value("APP_URL"),
        id: site.id.clone(),
        name: site.name.clone(),
        domain: site.domain.clone(),
        path: site.path.clone(),
    })
}

// === Commands ===

pub async fn run_command(state: &AddonState, request: CommandRequest) -> Result<ProcessResult> {
    let config = state.config.load();
    let result = state.site_runner().run_request(&config, &request).await?;
    if let Err(e) = history::record(&state.config, &request.command) {
        log::warn!("Failed to record command history: {}", e);
    }
    Ok(result)
}

pub fn get_history(state: &AddonState) -> Vec<String> {
    history::list(&state.config)
}

pub fn clear_history(state: &AddonState) -> Result<()> {
    history::clear(&state.config)
}

// === Env ===

pub fn get_env(state: &AddonState, request: &SiteRequest) -> Result<EnvSnapshot> {
    inspect::read_site_env(&state.site_runner(), request)
}

pub fn update_env(state: &AddonState, request: &UpdateEnvRequest) -> Result<()> {
    inspect::update_site_env(&state.site_runner(), request)
}

// === Queue & logs ===

pub async fn queue_failed(state: &AddonState, request: &SiteRequest) -> Result<Vec<FailedJob>> {
    inspect::queue_failed(&state.site_runner(), &state.config.load(), request).await
}

pub async fn queue_retry(state: &AddonState, request: &QueueJobRequest) -> Result<QueueActionResponse> {
    inspect::queue_retry(&state.site_runner(), &state.config.load(), request).await
}

pub async fn queue_forget(state: &AddonState, request: &QueueJobRequest) -> Result<QueueActionResponse> {
    inspect::queue_forget(&state.site_runner(), &state.config.load(), request).await
}

pub async fn queue_flush(state: &AddonState, request: &SiteRequest) -> Result<QueueActionResponse> {
    inspect::queue_flush(&state.site_runner(), &state.config.load(), request).await
}

pub fn get_logs(state: &AddonState, request: &LogsRequest) -> Result<LogTail> {
    inspect::site_logs(&state.site_runner(), request)
}

// === Launchers ===

/// Project directory when it exists, otherwise the site root; always inside the root.
fn launch_dir(site: &SiteRecord) -> Result<PathBuf> {
    let app_dir = site.app_dir();
    let candidate = if app_dir.is_dir() { app_dir } else { site.path.clone() };
    resolve_within_root(site.root(), &candidate.to_string_lossy())
}

pub fn open_site(state: &AddonState, request: &SiteRequest, target: LaunchTarget) -> Result<()> {
    request.validate()?;
    let site = state.registry.require_site(&request.site_id)?;
    let dir = launch_dir(&site)?;
    launch::open(target, &dir, &state.config.load().editor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{laravel_site, registry, FakeExecutor};

    fn state(tmp: &tempfile::TempDir) -> (AddonState, Arc<JsonSiteRegistry>) {
        let config = Arc::new(ConfigStore::open(tmp.path().join("data")).unwrap());
        let reg = registry(tmp.path());
        let state = AddonState::new(config, reg.clone(), Arc::new(FakeExecutor::succeeding()));
        (state, reg)
    }

    #[test]
    fn reads_framework_version_from_lock_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(
            tmp.path().join("composer.lock"),
            r#"{"packages":[{"name":"brick/math","version":"0.12.1"},{"name":"laravel/framework","version":"v11.9.2"}]}"#,
        )
        .unwrap();
        assert_eq!(installed_framework_version(tmp.path()).as_deref(), Some("11.9.2"));
        assert!(installed_framework_version(&tmp.path().join("nope")).is_none());
    }

    #[test]
    fn info_combines_registry_and_env() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (state, reg) = state(&tmp);
        let site = laravel_site(&reg, "Demo");
        fs::write(site.env_path(), "APP_ENV=local\nAPP_URL=http://demo.local\n").unwrap();

        let info = get_info(&state, &SiteRequest { site_id: site.id.clone() }).unwrap();
        assert_eq!(info.app_env.as_deref(), Some("local"));
        assert_eq!(info.app_url.as_deref(), Some("http://demo.local"));
        assert_eq!(info.php_version.as_deref(), Some("8.3"));
        assert!(info.app_path.ends_with("app"));
    }

    #[test]
    fn site_listing_flags_laravel_sites() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (state, reg) = state(&tmp);
        let site = laravel_site(&reg, "Demo");
        reg.add_site(&NewSite {
            name: "Plain".to_string(),
            domain: "plain.local".to_string(),
            php_version: None,
        })
        .unwrap();

        let sites = get_sites(&state).unwrap();
        assert_eq!(sites.len(), 2);
        assert!(sites.iter().any(|s| s.id == site.id && s.is_laravel));
        assert!(sites.iter().any(|s| s.name == "Plain" && !s.is_laravel));

        assert!(is_laravel_site(&state, &SiteRequest { site_id: site.id }).unwrap());
        assert!(!is_laravel_site(&state, &SiteRequest { site_id: "unknown".into() }).unwrap());
    }

    #[tokio::test]
    async fn run_command_records_history_only_when_accepted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (state, reg) = state(&tmp);
        let site = laravel_site(&reg, "Demo");

        let accepted = CommandRequest {
            site_id: site.id.clone(),
            command: vec!["route:list".to_string()],
            cwd: None,
        };
        assert!(run_command(&state, accepted).await.unwrap().success);

        let rejected = CommandRequest {
            site_id: site.id.clone(),
            command: vec!["tinker".to_string()],
            cwd: None,
        };
        let err = run_command(&state, rejected).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityPolicy);

        assert_eq!(get_history(&state), vec!["route:list"]);
        clear_history(&state).unwrap();
        assert!(get_history(&state).is_empty());
    }

    #[test]
    fn launch_dir_prefers_project_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (_state, reg) = state(&tmp);
        let site = laravel_site(&reg, "Demo");
        let dir = launch_dir(&site).unwrap();
        assert_eq!(dir, site.app_dir().canonicalize().unwrap());

        fs::remove_dir_all(site.app_dir()).unwrap();
        assert_eq!(launch_dir(&site).unwrap(), site.path.canonicalize().unwrap());
    }
}
