//! Schema validation for every value that crosses the message bridge.
//!
//! Each request type runs through its schema before any handler logic. A
//! failed check returns [`AppError::validation`] with every message collected,
//! so the UI can show all problems at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::env_file;
use crate::error::{AppError, Result};
use crate::shell_safety::{
    contains_dangerous_characters, contains_path_traversal, find_dangerous_character,
};
use crate::whitelist;

pub const MAX_COMMAND_PARTS: usize = 20;
pub const MAX_COMMAND_PART_LEN: usize = 200;
pub const MAX_ENV_CONTENT_LEN: usize = 100_000;
pub const MAX_LOG_LINES: usize = 1000;

/// Project versions offered by the creation wizard.
pub const LARAVEL_VERSIONS: &[&str] = &["10", "11", "12"];

#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("field pattern must compile")
}

static SITE_ID_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[A-Za-z0-9_-]+$"));
static SITE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[A-Za-z0-9\s_-]+$"));
static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.local$"));
static NUMERIC_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^\d+(?:\.\d+){0,2}$"));
static JOB_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"^(?:\d{1,20}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$")
});

/// Rule for one string field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub min_len: usize,
    pub max_len: usize,
    pub pattern: Option<&'static LazyLock<Regex>>,
    /// Shown when the pattern does not match.
    pub pattern_hint: &'static str,
}

impl FieldRule {
    /// Check `value`, pushing a message per violated constraint.
    pub fn check(&self, value: &str, errors: &mut Vec<String>) {
        let len = value.chars().count();
        if len < self.min_len {
            if self.min_len == 1 {
                errors.push(format!("{} is required", self.field));
            } else {
                errors.push(format!(
                    "{} must be at least {} characters",
                    self.field, self.min_len
                ));
            }
            return;
        }
        if len > self.max_len {
            errors.push(format!(
                "{} must be at most {} characters",
                self.field, self.max_len
            ));
            return;
        }
        if let Some((pos, c)) = find_dangerous_character(value) {
            errors.push(format!(
                "{} contains forbidden character '{}' at position {}",
                self.field,
                c.escape_default(),
                pos
            ));
            return;
        }
        if let Some(pattern) = self.pattern {
            if !pattern.is_match(value) {
                errors.push(format!("{} {}", self.field, self.pattern_hint));
            }
        }
    }
}

pub static SITE_ID: FieldRule = FieldRule {
    field: "siteId",
    min_len: 1,
    max_len: 100,
    pattern: Some(&SITE_ID_RE),
    pattern_hint: "may only contain letters, numbers, underscores and hyphens",
};

pub static SITE_NAME: FieldRule = FieldRule {
    field: "name",
    min_len: 2,
    max_len: 50,
    pattern: Some(&SITE_NAME_RE),
    pattern_hint: "may only contain letters, numbers, spaces, underscores and hyphens",
};

pub static DOMAIN: FieldRule = FieldRule {
    field: "domain",
    min_len: 3,
    max_len: 100,
    pattern: Some(&DOMAIN_RE),
    pattern_hint: "must be a lowercase name ending in .local",
};

pub static PHP_VERSION: FieldRule = FieldRule {
    field: "phpVersion",
    min_len: 1,
    max_len: 20,
    pattern: Some(&NUMERIC_VERSION_RE),
    pattern_hint: "must look like 8.3 or 8.3.12",
};

pub static JOB_ID: FieldRule = FieldRule {
    field: "jobId",
    min_len: 1,
    max_len: 40,
    pattern: Some(&JOB_ID_RE),
    pattern_hint: "must be a numeric id or a UUID",
};

/// A request payload with a schema.
pub trait Validate {
    fn collect_errors(&self, errors: &mut Vec<String>);

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.collect_errors(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            log::info!("Rejected request: {}", errors.join("; "));
            Err(AppError::validation(errors))
        }
    }
}

/// Requests that only carry a site identifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRequest {
    pub site_id: String,
}

impl Validate for SiteRequest {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        SITE_ID.check(&self.site_id, errors);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSiteRequest {
    pub name: String,
    pub domain: String,
    pub version: String,
    pub php_version: Option<String>,
    pub starter_kit: Option<String>,
    pub breeze_stack: Option<String>,
    pub breeze_dark_mode: Option<bool>,
    pub jetstream_stack: Option<String>,
    pub jetstream_teams: Option<bool>,
    pub jetstream_api: Option<bool>,
    pub jetstream_verification: Option<bool>,
    pub pest: Option<bool>,
    pub build_assets: Option<bool>,
}

pub const BREEZE_STACKS: &[&str] = &["blade", "livewire", "livewire-functional", "react", "vue", "api"];
pub const JETSTREAM_STACKS: &[&str] = &["livewire", "inertia"];
pub const STARTER_KITS: &[&str] = &["none", "breeze", "jetstream"];

impl Validate for CreateSiteRequest {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        SITE_NAME.check(&self.name, errors);
        DOMAIN.check(&self.domain, errors);

        if !LARAVEL_VERSIONS.contains(&self.version.as_str()) {
            errors.push(format!(
                "version must be one of {}",
                LARAVEL_VERSIONS.join(", ")
            ));
        }
        if let Some(php) = &self.php_version {
            PHP_VERSION.check(php, errors);
        }

        let kit = self.starter_kit.as_deref().unwrap_or("none");
        if !STARTER_KITS.contains(&kit) {
            errors.push(format!(
                "starterKit must be one of {}",
                STARTER_KITS.join(", ")
            ));
            return;
        }

        let breeze_opts = self.breeze_stack.is_some() || self.breeze_dark_mode.is_some();
        let jetstream_opts = self.jetstream_stack.is_some()
            || self.jetstream_teams.is_some()
            || self.jetstream_api.is_some()
            || self.jetstream_verification.is_some();

        match kit {
            "breeze" => match self.breeze_stack.as_deref() {
                None => errors.push("breezeStack is required when starterKit is breeze".into()),
                Some(stack) if !BREEZE_STACKS.contains(&stack) => errors.push(format!(
                    "breezeStack must be one of {}",
                    BREEZE_STACKS.join(", ")
                )),
                Some(_) => {}
            },
            "jetstream" => match self.jetstream_stack.as_deref() {
                None => {
                    errors.push("jetstreamStack is required when starterKit is jetstream".into())
                }
                Some(stack) if !JETSTREAM_STACKS.contains(&stack) => errors.push(format!(
                    "jetstreamStack must be one of {}",
                    JETSTREAM_STACKS.join(", ")
                )),
                Some(_) => {}
            },
            _ => {}
        }

        if breeze_opts && kit != "breeze" {
            errors.push("breeze options require starterKit breeze".into());
        }
        if jetstream_opts && kit != "jetstream" {
            errors.push("jetstream options require starterKit jetstream".into());
        }
        if self.pest.is_some() && kit == "none" {
            errors.push("pest option requires a starter kit".into());
        }
    }
}

/// A user-typed Artisan command for one site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub site_id: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl CommandRequest {
    /// Whitelist violations and forbidden characters are security-policy
    /// rejections; everything else is an ordinary validation error.
    pub fn validate_policy(&self) -> Result<()> {
        self.screen_security()?;
        self.validate()?;
        if !whitelist::is_allowed(&self.command) {
            let base = self.command.first().map(String::as_str).unwrap_or("");
            log::warn!(target: "security", "Blocked non-whitelisted command '{}' for site {}", base, self.site_id);
            return Err(AppError::security_policy(format!(
                "Command '{}' is not allowed",
                base
            )));
        }
        Ok(())
    }

    fn screen_security(&self) -> Result<()> {
        for (i, part) in self.command.iter().enumerate() {
            if let Some((pos, c)) = find_dangerous_character(part) {
                log::warn!(
                    target: "security",
                    "Blocked command part {} for site {}: '{}' at position {}",
                    i,
                    self.site_id,
                    c.escape_default(),
                    pos
                );
                return Err(AppError::security_policy(format!(
                    "Command part {} contains forbidden character '{}'",
                    i,
                    c.escape_default()
                )));
            }
        }
        if let Some(cwd) = &self.cwd {
            if let Some((pos, c)) = find_dangerous_character(cwd) {
                log::warn!(
                    target: "security",
                    "Blocked working directory for site {}: '{}' at position {}",
                    self.site_id,
                    c.escape_default(),
                    pos
                );
                return Err(AppError::security_policy(
                    "Working directory contains forbidden characters",
                ));
            }
            if contains_path_traversal(cwd) {
                log::warn!(
                    target: "security",
                    "Blocked working directory {:?} for site {}: path traversal",
                    cwd,
                    self.site_id
                );
                return Err(AppError::security_policy(
                    "Working directory must not contain '..' segments",
                ));
            }
        }
        Ok(())
    }
}

impl Validate for CommandRequest {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        SITE_ID.check(&self.site_id, errors);

        if self.command.is_empty() {
            errors.push("command is required".into());
        } else if self.command.len() > MAX_COMMAND_PARTS {
            errors.push(format!(
                "command may have at most {} parts",
                MAX_COMMAND_PARTS
            ));
        }
        for (i, part) in self.command.iter().enumerate() {
            if part.chars().count() > MAX_COMMAND_PART_LEN {
                errors.push(format!(
                    "command part {} exceeds {} characters",
                    i, MAX_COMMAND_PART_LEN
                ));
            } else if contains_dangerous_characters(part) {
                errors.push(format!("command part {} contains forbidden characters", i));
            }
        }
        if let Some(cwd) = &self.cwd {
            if cwd.is_empty() || cwd.chars().count() > 500 {
                errors.push("cwd must be between 1 and 500 characters".into());
            } else if contains_dangerous_characters(cwd) {
                errors.push("cwd contains forbidden characters".into());
            } else if contains_path_traversal(cwd) {
                errors.push("cwd must not contain '..' segments".into());
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvRequest {
    pub site_id: String,
    pub content: String,
}

impl Validate for UpdateEnvRequest {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        SITE_ID.check(&self.site_id, errors);
        if self.content.chars().count() > MAX_ENV_CONTENT_LEN {
            errors.push(format!(
                "content must be at most {} characters",
                MAX_ENV_CONTENT_LEN
            ));
            return;
        }
        errors.extend(env_file::validate_content(&self.content));
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJobRequest {
    pub site_id: String,
    pub job_id: String,
}

impl Validate for QueueJobRequest {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        SITE_ID.check(&self.site_id, errors);
        JOB_ID.check(&self.job_id, errors);
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsRequest {
    pub site_id: String,
    #[serde(default = "default_log_lines")]
    pub lines: usize,
}

fn default_log_lines() -> usize {
    100
}

impl Validate for LogsRequest {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        SITE_ID.check(&self.site_id, errors);
        if self.lines == 0 || self.lines > MAX_LOG_LINES {
            errors.push(format!("lines must be between 1 and {}", MAX_LOG_LINES));
        }
    }
}

/// Resolve `candidate` (absolute, or relative to `root`) and require it to be
/// `root` itself or inside it. Both sides are canonicalized, so symlinks and
/// `..` segments are resolved before comparing.
pub fn resolve_within_root(root: &Path, candidate: &str) -> Result<PathBuf> {
    let root_canonical = root
        .canonicalize()
        .map_err(|e| AppError::io(format!("Failed to resolve site root {:?}: {}", root, e)))?;

    let candidate_path = Path::new(candidate);
    let joined = if candidate_path.is_absolute() {
        candidate_path.to_path_buf()
    } else {
        root_canonical.join(candidate_path)
    };

    let canonical = joined.canonicalize().map_err(|_| {
        log::warn!(target: "security", "Rejected unresolvable working directory {:?}", joined);
        AppError::security_policy("Working directory does not exist inside the site")
    })?;

    if !canonical.starts_with(&root_canonical) {
        log::warn!(
            target: "security",
            "Rejected working directory {:?} outside site root {:?}",
            canonical,
            root_canonical
        );
        return Err(AppError::security_policy(
            "Working directory is outside the site directory",
        ));
    }

    Ok(canonical)
}

/// Create `path` if missing and return its canonical form.
pub fn ensure_and_canonicalize_dir(path: &Path, label: &str) -> Result<PathBuf> {
    fs::create_dir_all(path)
        .map_err(|e| AppError::io(format!("Failed to create {} dir: {}", label, e)))?;
    path.canonicalize()
        .map_err(|e| AppError::io(format!("Failed to resolve {} dir: {}", label, e)))
}
