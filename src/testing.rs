//! Fixtures shared by unit tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::process::{Program, ProcessExecutor, ProcessResult, RunOptions};
use crate::site::{JsonSiteRegistry, NewSite, SiteRecord, SiteRegistry, SITE_TYPE_KEY, SITE_TYPE_LARAVEL};

#[derive(Debug, Clone)]
pub struct Call {
    pub program: Program,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Call {
    /// Arguments after the program, joined with spaces.
    pub fn line(&self) -> String {
        self.args.join(" ")
    }

    pub fn runs_artisan(&self) -> bool {
        self.program
            .leading_args
            .first()
            .is_some_and(|p| p.ends_with("artisan"))
    }
}

type Script = Box<dyn Fn(&Call) -> ProcessResult + Send + Sync>;

/// Records every invocation and answers from a script instead of spawning.
pub struct FakeExecutor {
    calls: Mutex<Vec<Call>>,
    script: Script,
}

impl FakeExecutor {
    pub fn succeeding() -> Self {
        Self::scripted(|_| ok(""))
    }

    pub fn scripted(script: impl Fn(&Call) -> ProcessResult + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessExecutor for FakeExecutor {
    async fn run(&self, program: &Program, args: &[String], options: &RunOptions) -> ProcessResult {
        let call = Call {
            program: program.clone(),
            args: args.to_vec(),
            cwd: options.cwd.clone(),
        };
        let result = (self.script)(&call);
        self.calls.lock().unwrap().push(call);
        result
    }
}

pub fn ok(output: &str) -> ProcessResult {
    ProcessResult {
        success: true,
        output: output.to_string(),
        exit_code: 0,
        duration_ms: 1,
    }
}

pub fn failed(output: &str) -> ProcessResult {
    ProcessResult {
        success: false,
        output: output.to_string(),
        exit_code: 1,
        duration_ms: 1,
    }
}

pub fn registry(root: &Path) -> Arc<JsonSiteRegistry> {
    Arc::new(JsonSiteRegistry::new(
        root.join("sites.json"),
        root.join("Local Sites"),
        Some(root.join("run")),
    ))
}

/// Write the files that make a directory look like a Laravel project.
pub fn scaffold_laravel(app_dir: &Path) {
    fs::create_dir_all(app_dir.join("storage").join("logs")).unwrap();
    fs::create_dir_all(app_dir.join("bootstrap").join("cache")).unwrap();
    fs::write(app_dir.join("artisan"), "#!/usr/bin/env php\n").unwrap();
    fs::write(app_dir.join("composer.json"), "{}\n").unwrap();
    fs::write(
        app_dir.join(".env.example"),
        "APP_NAME=Laravel\nAPP_ENV=production\nAPP_KEY=\n\n# Database\nDB_CONNECTION=sqlite\n",
    )
    .unwrap();
}

/// A registered site marked as Laravel with a scaffolded project.
pub fn laravel_site(registry: &JsonSiteRegistry, name: &str) -> SiteRecord {
    let site = registry
        .add_site(&NewSite {
            name: name.to_string(),
            domain: "demo.local".to_string(),
            php_version: Some("8.3".to_string()),
        })
        .unwrap();
    registry
        .update_custom_options(
            &site.id,
            HashMap::from([(SITE_TYPE_KEY.to_string(), SITE_TYPE_LARAVEL.to_string())]),
        )
        .unwrap();
    scaffold_laravel(&site.app_dir());
    registry.require_site(&site.id).unwrap()
}
