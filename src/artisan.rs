//! Artisan invocations for a registered site.

use std::path::Path;
use std::sync::Arc;

use crate::config::AddonConfig;
use crate::error::{AppError, Result};
use crate::paths::{get_artisan_path, is_laravel_project};
use crate::php::resolve_php;
use crate::process::{Program, ProcessExecutor, ProcessResult, RunOptions};
use crate::site::{SiteRecord, SiteRegistry};
use crate::validation::{resolve_within_root, CommandRequest};

pub struct SiteCommandRunner {
    executor: Arc<dyn ProcessExecutor>,
    registry: Arc<dyn SiteRegistry>,
}

impl SiteCommandRunner {
    pub fn new(executor: Arc<dyn ProcessExecutor>, registry: Arc<dyn SiteRegistry>) -> Self {
        Self { executor, registry }
    }

    pub fn registry(&self) -> &Arc<dyn SiteRegistry> {
        &self.registry
    }

    /// Look up a site that was created as a Laravel site and still has its project.
    pub fn laravel_site(&self, site_id: &str) -> Result<SiteRecord> {
        let site = self.registry.require_site(site_id)?;
        if !site.is_laravel() || !is_laravel_project(&site.app_dir()) {
            return Err(AppError::not_laravel_site(site_id));
        }
        Ok(site)
    }

    /// Run a user-supplied command after the policy checks.
    ///
    /// Rejections come back as errors before anything is spawned; a command
    /// that ran and failed is an `Ok` with an unsuccessful result.
    pub async fn run_request(&self, config: &AddonConfig, request: &CommandRequest) -> Result<ProcessResult> {
        request.validate_policy()?;
        let site = self.laravel_site(&request.site_id)?;

        let cwd = match &request.cwd {
            Some(cwd) => resolve_within_root(site.root(), cwd)?,
            None => site.app_dir(),
        };

        log::info!(
            "Running artisan {} for site {}",
            request.command.join(" "),
            site.id
        );
        Ok(self.artisan_in(config, &site, &request.command, &cwd).await)
    }

    /// Run `php artisan <args>` in the site's project directory.
    ///
    /// Only for argument lists the addon built itself (or already validated).
    pub async fn artisan(&self, config: &AddonConfig, site: &SiteRecord, args: &[String]) -> ProcessResult {
        self.artisan_in(config, site, args, &site.app_dir()).await
    }

    async fn artisan_in(&self, config: &AddonConfig, site: &SiteRecord, args: &[String], cwd: &Path) -> ProcessResult {
        let php = resolve_php(config, site);
        let program = Program::script(php, get_artisan_path(&site.app_dir()));
        let options = RunOptions::new(config.artisan_timeout()).cwd(cwd);
        self.executor.run(&program, args, &options).await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::ErrorKind;
    use crate::site::NewSite;
    use crate::testing::{laravel_site, registry, FakeExecutor};

    fn request(site_id: &str, command: &[&str], cwd: Option<&str>) -> CommandRequest {
        CommandRequest {
            site_id: site_id.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            cwd: cwd.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn runs_whitelisted_command_in_app_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        let result = runner
            .run_request(&AddonConfig::default(), &request(&site.id, &["migrate:status"], None))
            .await
            .unwrap();
        assert!(result.success);

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].runs_artisan());
        assert_eq!(calls[0].args, vec!["migrate:status".to_string()]);
        assert_eq!(calls[0].cwd.as_deref(), Some(site.app_dir().as_path()));
    }

    #[tokio::test]
    async fn serve_is_rejected_before_spawn() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        let err = runner
            .run_request(&AddonConfig::default(), &request(&site.id, &["serve"], None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityPolicy);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn metacharacters_are_rejected_before_spawn() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        let err = runner
            .run_request(
                &AddonConfig::default(),
                &request(&site.id, &["migrate", "--path=$(whoami)"], None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityPolicy);
        assert!(fake.calls().is_empty());

        let err = runner
            .run_request(
                &AddonConfig::default(),
                &request(&site.id, &["migrate"], Some("app/../../x")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityPolicy);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn cwd_outside_site_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        let outside = tmp.path().to_string_lossy().to_string();
        let err = runner
            .run_request(
                &AddonConfig::default(),
                &request(&site.id, &["route:list"], Some(&outside)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityPolicy);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn relative_cwd_inside_site_is_accepted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        fs::create_dir_all(site.app_dir().join("database")).unwrap();
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        runner
            .run_request(
                &AddonConfig::default(),
                &request(&site.id, &["migrate"], Some("app/database")),
            )
            .await
            .unwrap();
        let cwd = fake.calls()[0].cwd.clone().unwrap();
        assert!(cwd.ends_with("app/database"));
    }

    #[tokio::test]
    async fn non_laravel_site_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let plain = reg
            .add_site(&NewSite {
                name: "Plain".to_string(),
                domain: "plain.local".to_string(),
                php_version: None,
            })
            .unwrap();
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        let err = runner
            .run_request(&AddonConfig::default(), &request(&plain.id, &["migrate"], None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotLaravelSite);

        let err = runner
            .run_request(&AddonConfig::default(), &request("missing", &["migrate"], None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SiteNotFound);
    }
}
