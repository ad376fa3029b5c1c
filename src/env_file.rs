//! Reading, editing and writing a project's `.env` file.
//!
//! Lines keep their original text unless a key is changed, so comments,
//! blank lines and ordering survive an upsert.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{AppError, Result};

pub const BACKUP_FILE_NAME: &str = ".env.backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvLine {
    Blank(String),
    Comment(String),
    Pair {
        key: String,
        value: String,
        raw: String,
    },
    /// A line that is neither a comment nor `KEY=VALUE`. Never written back.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<EnvLine>,
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_line(line: &str) -> EnvLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return EnvLine::Blank(line.to_string());
    }
    if trimmed.starts_with('#') {
        return EnvLine::Comment(line.to_string());
    }
    match trimmed.split_once('=') {
        Some((key, value)) if is_valid_key(key) => EnvLine::Pair {
            key: key.to_string(),
            value: decode_value(value),
            raw: line.to_string(),
        },
        _ => EnvLine::Invalid(line.to_string()),
    }
}

fn decode_value(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return unescape_double_quoted(&raw[1..raw.len() - 1]);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    raw.to_string()
}

fn unescape_double_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn needs_quoting(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#' | '\\'))
}

/// Render a value for the right-hand side of `KEY=VALUE`.
pub fn format_value(value: &str) -> String {
    if !needs_quoting(value) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl EnvFile {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(parse_line).collect(),
        }
    }

    pub fn lines(&self) -> &[EnvLine] {
        &self.lines
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            EnvLine::Pair { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn entries(&self) -> Vec<EnvEntry> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                EnvLine::Pair { key, value, .. } => Some(EnvEntry {
                    key: key.clone(),
                    value: value.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Update `key` in place if present, append it otherwise.
    pub fn set(&mut self, key: &str, value: &str) {
        let raw = format!("{}={}", key, format_value(value));
        let existing = self.lines.iter_mut().find_map(|line| match line {
            EnvLine::Pair {
                key: k,
                value: v,
                raw: r,
            } if k.as_str() == key => Some((v, r)),
            _ => None,
        });
        match existing {
            Some((v, r)) => {
                *v = value.to_string();
                *r = raw;
            }
            None => self.lines.push(EnvLine::Pair {
                key: key.to_string(),
                value: value.to_string(),
                raw,
            }),
        }
    }

    /// Messages for every line that breaks the `KEY=VALUE` invariant.
    pub fn validate(&self) -> Vec<String> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| match line {
                EnvLine::Invalid(raw) => Some(format!(
                    "line {}: expected KEY=VALUE, found '{}'",
                    i + 1,
                    truncate(raw.trim(), 60)
                )),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for EnvFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            let text = match line {
                EnvLine::Blank(raw) | EnvLine::Comment(raw) | EnvLine::Invalid(raw) => raw,
                EnvLine::Pair { raw, .. } => raw,
            };
            writeln!(f, "{}", text)?;
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

/// Validate raw content submitted for the env editor.
pub fn validate_content(content: &str) -> Vec<String> {
    EnvFile::parse(content).validate()
}

pub fn backup_path(env_path: &Path) -> PathBuf {
    env_path.with_file_name(BACKUP_FILE_NAME)
}

/// Read the env file, returning an empty string when it does not exist yet.
pub fn read_env(env_path: &Path) -> Result<String> {
    if !env_path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(env_path)
        .map_err(|e| AppError::io(format!("Failed to read {:?}: {}", env_path, e)))
}

/// Validate `content`, copy the current file to `.env.backup`, then replace
/// it through a staging file in the same directory.
pub fn write_env_with_backup(env_path: &Path, content: &str) -> Result<()> {
    let errors = validate_content(content);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    if env_path.exists() {
        let backup = backup_path(env_path);
        fs::copy(env_path, &backup)
            .map_err(|e| AppError::io(format!("Failed to back up {:?}: {}", env_path, e)))?;
    }

    let staging = env_path.with_file_name(".env.tmp");
    fs::write(&staging, content)
        .map_err(|e| AppError::io(format!("Failed to write {:?}: {}", staging, e)))?;
    fs::rename(&staging, env_path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        AppError::io(format!("Failed to replace {:?}: {}", env_path, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "APP_NAME=Laravel\n# database\n\nDB_HOST=127.0.0.1\nDB_PASSWORD=\n";

    #[test]
    fn parses_pairs_comments_and_blanks() {
        let env = EnvFile::parse(SAMPLE);
        assert_eq!(env.lines().len(), 5);
        assert_eq!(env.get("APP_NAME"), Some("Laravel"));
        assert_eq!(env.get("DB_PASSWORD"), Some(""));
        assert!(matches!(env.lines()[1], EnvLine::Comment(_)));
        assert!(matches!(env.lines()[2], EnvLine::Blank(_)));
        assert!(env.validate().is_empty());
        assert_eq!(env.to_string(), SAMPLE);
    }

    #[test]
    fn key_rules() {
        assert!(is_valid_key("APP_KEY"));
        assert!(is_valid_key("_PRIVATE1"));
        assert!(!is_valid_key("1APP"));
        assert!(!is_valid_key("APP-KEY"));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn rejects_lines_without_assignment() {
        let errors = validate_content("APP_NAME=x\nnot a valid line\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("line 2"));
        assert_eq!(validate_content("export APP=x").len(), 1);
    }

    #[test]
    fn quoted_values_round_trip() {
        let values = [
            "My App",
            "say \"hi\"",
            "it's",
            "back\\slash",
            "hash # inside",
            "multi\nline",
            "plain",
            "",
        ];
        let mut env = EnvFile::default();
        for (i, value) in values.iter().enumerate() {
            env.set(&format!("KEY_{i}"), value);
        }
        let reparsed = EnvFile::parse(&env.to_string());
        for (i, value) in values.iter().enumerate() {
            assert_eq!(reparsed.get(&format!("KEY_{i}")), Some(*value));
        }
        assert!(reparsed.validate().is_empty());
    }

    #[test]
    fn format_value_quotes_only_when_needed() {
        assert_eq!(format_value("local"), "local");
        assert_eq!(format_value("My App"), "\"My App\"");
        assert_eq!(format_value("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn upsert_updates_in_place_and_appends() {
        let mut env = EnvFile::parse(SAMPLE);
        env.set("DB_HOST", "localhost");
        env.set("DB_SOCKET", "/tmp/mysqld.sock");
        let text = env.to_string();
        assert!(text.starts_with("APP_NAME=Laravel\n# database\n\nDB_HOST=localhost\n"));
        assert!(text.ends_with("DB_SOCKET=/tmp/mysqld.sock\n"));
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut once = EnvFile::parse(SAMPLE);
        once.set("APP_NAME", "My App");
        once.set("APP_URL", "http://my-app.local");

        let mut twice = once.clone();
        twice.set("APP_NAME", "My App");
        twice.set("APP_URL", "http://my-app.local");

        assert_eq!(once.to_string(), twice.to_string());
        assert_eq!(twice.to_string().matches("APP_URL=").count(), 1);
    }

    #[test]
    fn single_quoted_values_are_literal() {
        let env = EnvFile::parse("A='x \\n y'\n");
        assert_eq!(env.get("A"), Some("x \\n y"));
    }

    #[test]
    fn write_creates_backup_of_previous_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let env_path = tmp.path().join(".env");
        fs::write(&env_path, "APP_NAME=Old\n").unwrap();

        write_env_with_backup(&env_path, "APP_NAME=New\n").unwrap();

        assert_eq!(fs::read_to_string(&env_path).unwrap(), "APP_NAME=New\n");
        assert_eq!(
            fs::read_to_string(backup_path(&env_path)).unwrap(),
            "APP_NAME=Old\n"
        );
        assert!(!tmp.path().join(".env.tmp").exists());
    }

    #[test]
    fn first_write_has_no_backup() {
        let tmp = tempfile::TempDir::new().unwrap();
        let env_path = tmp.path().join(".env");

        write_env_with_backup(&env_path, "APP_NAME=First\n").unwrap();

        assert_eq!(read_env(&env_path).unwrap(), "APP_NAME=First\n");
        assert!(!backup_path(&env_path).exists());
        assert!(!tmp.path().join(".env.tmp").exists());
    }

    #[test]
    fn invalid_write_leaves_file_untouched() {
        let tmp = tempfile::TempDir::new().unwrap();
        let env_path = tmp.path().join(".env");
        fs::write(&env_path, "APP_NAME=Old\n").unwrap();

        assert!(write_env_with_backup(&env_path, "not a valid line").is_err());

        assert_eq!(read_env(&env_path).unwrap(), "APP_NAME=Old\n");
        assert!(!backup_path(&env_path).exists());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(read_env(&tmp.path().join(".env")).unwrap(), "");
    }
}
