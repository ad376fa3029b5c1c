//! Read-only views into a Laravel site plus the queue maintenance commands.

use std::fs::File;
use std::io::{Read as _, Seek as _, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artisan::SiteCommandRunner;
use crate::config::AddonConfig;
use crate::env_file::{self, EnvEntry, EnvFile};
use crate::error::{AppError, Result};
use crate::process::ProcessResult;
use crate::validation::{LogsRequest, QueueJobRequest, SiteRequest, UpdateEnvRequest, Validate};

const TAIL_CHUNK: u64 = 64 * 1024;

/// Last `lines` lines of a text file; empty if the file does not exist.
pub fn tail_file(path: &Path, lines: usize) -> Result<Vec<String>> {
    if lines == 0 || !path.exists() {
        return Ok(Vec::new());
    }
    let mut file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open {:?}: {}", path, e)))?;
    let len = file.metadata()?.len();

    // Read backwards until enough newlines are buffered.
    let mut start = len;
    let mut buf: Vec<u8> = Vec::new();
    while start > 0 && buf.iter().filter(|b| **b == b'\n').count() <= lines {
        let chunk = TAIL_CHUNK.min(start);
        start -= chunk;
        file.seek(SeekFrom::Start(start))?;
        let mut piece = vec![0u8; chunk as usize];
        file.read_exact(&mut piece)?;
        piece.extend_from_slice(&buf);
        buf = piece;
    }

    let text = String::from_utf8_lossy(&buf);
    let all: Vec<&str> = text.lines().collect();
    let skip = all.len().saturating_sub(lines);
    Ok(all[skip..].iter().map(|l| l.to_string()).collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTail {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

pub fn site_logs(runner: &SiteCommandRunner, request: &LogsRequest) -> Result<LogTail> {
    request.validate()?;
    let site = runner.laravel_site(&request.site_id)?;
    let path = site.log_path();
    let lines = tail_file(&path, request.lines)?;
    Ok(LogTail { path, lines })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvSnapshot {
    pub content: String,
    pub entries: Vec<EnvEntry>,
}

pub fn read_site_env(runner: &SiteCommandRunner, request: &SiteRequest) -> Result<EnvSnapshot> {
    request.validate()?;
    let site = runner.laravel_site(&request.site_id)?;
    let content = env_file::read_env(&site.env_path())?;
    let entries = EnvFile::parse(&content).entries();
    Ok(EnvSnapshot { content, entries })
}

pub fn update_site_env(runner: &SiteCommandRunner, request: &UpdateEnvRequest) -> Result<()> {
    request.validate()?;
    let site = runner.laravel_site(&request.site_id)?;
    env_file::write_env_with_backup(&site.env_path(), &request.content)?;
    log::info!("Updated .env for site {}", site.id);
    Ok(())
}

/// One row of `queue:failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub id: String,
    pub connection: String,
    pub queue: String,
    pub job: String,
    pub failed_at: String,
}

fn is_border(line: &str) -> bool {
    let t = line.trim();
    !t.is_empty() && t.chars().all(|c| matches!(c, '+' | '-' | '=' | '|' | ' '))
}

fn split_row(line: &str) -> Vec<String> {
    let t = line.trim().trim_start_matches('|').trim_end_matches('|');
    t.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// Parse the bordered table `queue:failed` prints.
///
/// Anything that is not a `|` row (borders, "No failed jobs found." and
/// similar notices) is ignored; the first row is the header.
pub fn parse_failed_jobs(output: &str) -> Vec<FailedJob> {
    let mut rows = output
        .lines()
        .filter(|l| l.trim_start().starts_with('|') && !is_border(l))
        .map(split_row);

    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(|h| h.to_ascii_lowercase()).collect();
    let column = |row: &[String], names: &[&str]| -> String {
        header
            .iter()
            .position(|h| names.contains(&h.as_str()))
            .and_then(|i| row.get(i))
            .cloned()
            .unwrap_or_default()
    };

    rows.map(|row| FailedJob {
        id: column(&row, &["id", "uuid"]),
        connection: column(&row, &["connection"]),
        queue: column(&row, &["queue"]),
        job: column(&row, &["class", "job"]),
        failed_at: column(&row, &["failed at", "failed_at"]),
    })
    .collect()
}

pub async fn queue_failed(
    runner: &SiteCommandRunner,
    config: &AddonConfig,
    request: &SiteRequest,
) -> Result<Vec<FailedJob>> {
    request.validate()?;
    let site = runner.laravel_site(&request.site_id)?;
    let result = runner
        .artisan(config, &site, &["queue:failed".to_string()])
        .await;
    if !result.success {
        return Err(AppError::process(format!(
            "queue:failed failed: {}",
            result.tail(5)
        )));
    }
    Ok(parse_failed_jobs(&result.output))
}

/// Reply for the queue maintenance channels.
#[derive(Debug, Clone, Serialize)]
pub struct QueueActionResponse {
    pub success: bool,
    pub message: String,
}

impl QueueActionResponse {
    /// Artisan's own last lines when it printed any, `fallback` otherwise.
    fn from_result(command: &str, result: &ProcessResult, fallback: String) -> Self {
        let tail = result.tail(3);
        let message = if !tail.is_empty() {
            tail
        } else if result.success {
            fallback
        } else {
            format!("{} failed with exit code {}", command, result.exit_code)
        };
        Self {
            success: result.success,
            message,
        }
    }
}

async fn queue_command(
    runner: &SiteCommandRunner,
    config: &AddonConfig,
    site_id: &str,
    args: Vec<String>,
    fallback: String,
) -> Result<QueueActionResponse> {
    let site = runner.laravel_site(site_id)?;
    let result = runner.artisan(config, &site, &args).await;
    log::info!(
        "{} for site {}: exit {}",
        args.join(" "),
        site.id,
        result.exit_code
    );
    Ok(QueueActionResponse::from_result(&args[0], &result, fallback))
}

pub async fn queue_retry(
    runner: &SiteCommandRunner,
    config: &AddonConfig,
    request: &QueueJobRequest,
) -> Result<QueueActionResponse> {
    request.validate()?;
    let args = vec!["queue:retry".to_string(), request.job_id.clone()];
    let fallback = format!("Job {} pushed back onto the queue", request.job_id);
    queue_command(runner, config, &request.site_id, args, fallback).await
}

pub async fn queue_forget(
    runner: &SiteCommandRunner,
    config: &AddonConfig,
    request: &QueueJobRequest,
) -> Result<QueueActionResponse> {
    request.validate()?;
    let args = vec!["queue:forget".to_string(), request.job_id.clone()];
    let fallback = format!("Failed job {} deleted", request.job_id);
    queue_command(runner, config, &request.site_id, args, fallback).await
}

pub async fn queue_flush(
    runner: &SiteCommandRunner,
    config: &AddonConfig,
    request: &SiteRequest,
) -> Result<QueueActionResponse> {
    request.validate()?;
    let args = vec!["queue:flush".to_string()];
    let fallback = "All failed jobs deleted".to_string();
    queue_command(runner, config, &request.site_id, args, fallback).await
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{laravel_site, ok, registry, FakeExecutor};

    const FAILED_TABLE: &str = "\
+--------------------------------------+----------+---------+---------------------+---------------------+
| ID                                   | Connection | Queue | Class               | Failed At           |
+--------------------------------------+----------+---------+---------------------+---------------------+
| 5f0c8a3e-2d7b-4c1e-9a55-0f0e1d2c3b4a | database | default | App\\Jobs\\SendMail   | 2024-05-01 10:00:00 |
| 17                                   | redis    | emails  | App\\Jobs\\Resize     | 2024-05-02 11:30:00 |
+--------------------------------------+----------+---------+---------------------+---------------------+
";

    #[test]
    fn parses_failed_job_table() {
        let jobs = parse_failed_jobs(FAILED_TABLE);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "5f0c8a3e-2d7b-4c1e-9a55-0f0e1d2c3b4a");
        assert_eq!(jobs[0].connection, "database");
        assert_eq!(jobs[0].job, "App\\Jobs\\SendMail");
        assert_eq!(jobs[1].queue, "emails");
        assert_eq!(jobs[1].failed_at, "2024-05-02 11:30:00");
    }

    #[test]
    fn empty_queue_output_has_no_rows() {
        assert!(parse_failed_jobs("   INFO  No failed jobs found.\n").is_empty());
        assert!(parse_failed_jobs("").is_empty());
    }

    #[test]
    fn tails_last_lines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("laravel.log");
        let content: String = (1..=500).map(|i| format!("line {}\n", i)).collect();
        fs::write(&path, content).unwrap();

        let tail = tail_file(&path, 3).unwrap();
        assert_eq!(tail, vec!["line 498", "line 499", "line 500"]);
        assert_eq!(tail_file(&path, 1000).unwrap().len(), 500);
        assert!(tail_file(&tmp.path().join("missing.log"), 10).unwrap().is_empty());
    }

    #[test]
    fn tail_spans_chunk_boundaries() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("big.log");
        let long_line = "x".repeat(100_000);
        fs::write(&path, format!("first\n{}\nlast\n", long_line)).unwrap();

        let tail = tail_file(&path, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].len(), 100_000);
        assert_eq!(tail[1], "last");
    }

    #[test]
    fn env_update_keeps_backup_and_rejects_invalid_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        fs::write(site.env_path(), "APP_NAME=Demo\n").unwrap();
        let runner = SiteCommandRunner::new(Arc::new(FakeExecutor::succeeding()), reg);

        update_site_env(
            &runner,
            &UpdateEnvRequest {
                site_id: site.id.clone(),
                content: "APP_NAME=Changed\n".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(env_file::backup_path(&site.env_path())).unwrap(),
            "APP_NAME=Demo\n"
        );

        let err = update_site_env(
            &runner,
            &UpdateEnvRequest {
                site_id: site.id.clone(),
                content: "APP_NAME=Again\nthis is not valid\n".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let snapshot = read_site_env(&runner, &SiteRequest { site_id: site.id }).unwrap();
        assert_eq!(snapshot.content, "APP_NAME=Changed\n");
        assert_eq!(snapshot.entries[0].value, "Changed");
    }

    #[tokio::test]
    async fn queue_commands_pass_job_ids() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        let fake = Arc::new(FakeExecutor::scripted(|call| {
            if call.args.first().map(String::as_str) == Some("queue:failed") {
                ok(FAILED_TABLE)
            } else {
                ok("done")
            }
        }));
        let runner = SiteCommandRunner::new(fake.clone(), reg);
        let config = AddonConfig::default();

        let jobs = queue_failed(&runner, &config, &SiteRequest { site_id: site.id.clone() })
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);

        let request = QueueJobRequest {
            site_id: site.id.clone(),
            job_id: "17".to_string(),
        };
        let retried = queue_retry(&runner, &config, &request).await.unwrap();
        assert!(retried.success);
        assert_eq!(retried.message, "done");
        assert!(queue_forget(&runner, &config, &request).await.unwrap().success);
        queue_flush(&runner, &config, &SiteRequest { site_id: site.id.clone() })
            .await
            .unwrap();

        let lines: Vec<String> = fake.calls().iter().map(|c| c.line()).collect();
        assert_eq!(
            lines,
            vec!["queue:failed", "queue:retry 17", "queue:forget 17", "queue:flush"]
        );
    }

    #[test]
    fn queue_action_message_falls_back_when_artisan_is_silent() {
        let silent = ok("");
        let response = QueueActionResponse::from_result("queue:flush", &silent, "All clear".into());
        assert!(response.success);
        assert_eq!(response.message, "All clear");

        let broken = ProcessResult {
            success: false,
            output: String::new(),
            exit_code: 2,
            duration_ms: 4,
        };
        let response = QueueActionResponse::from_result("queue:retry", &broken, "unused".into());
        assert!(!response.success);
        assert_eq!(response.message, "queue:retry failed with exit code 2");

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_job_id_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = registry(tmp.path());
        let site = laravel_site(&reg, "Demo");
        let fake = Arc::new(FakeExecutor::succeeding());
        let runner = SiteCommandRunner::new(fake.clone(), reg);

        let err = queue_retry(
            &runner,
            &AddonConfig::default(),
            &QueueJobRequest {
                site_id: site.id,
                job_id: "all".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(fake.calls().is_empty());
    }
}
