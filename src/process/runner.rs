//! Argument-vector process runner with timeout and output capture.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::process::Command;

use super::control::{exit_code_of, force_kill_tree};
use super::{
    Program, ProcessExecutor, ProcessResult, RunOptions, EXIT_FAILURE, EXIT_TIMEOUT,
    MAX_OUTPUT_BYTES, READER_GRACE,
};
use crate::shell_safety::{display_command, find_dangerous_character};

/// Spawns children directly, never through a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

async fn read_stream<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        log::debug!("Output stream closed with error: {}", e);
    }
    if buf.len() > MAX_OUTPUT_BYTES {
        buf.truncate(MAX_OUTPUT_BYTES);
        let mut text = String::from_utf8_lossy(&buf).into_owned();
        text.push_str("\n[output truncated]\n");
        return text;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn join_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) if stdout.ends_with('\n') => format!("{}{}", stdout, stderr),
        (false, false) => format!("{}\n{}", stdout, stderr),
    }
}

/// Append `line` to captured output, starting it on its own line.
fn append_line(output: &mut String, line: &str) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(line);
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl ProcessExecutor for ProcessRunner {
    async fn run(&self, program: &Program, args: &[String], options: &RunOptions) -> ProcessResult {
        let start = Instant::now();

        // Every argument is re-checked, whatever the caller validated.
        for arg in args {
            if let Some((pos, c)) = find_dangerous_character(arg) {
                log::warn!(
                    target: "security",
                    "Refused to spawn {}: argument contains '{}' at position {}",
                    program.display_name(),
                    c.escape_default(),
                    pos
                );
                return ProcessResult::rejected(format!(
                    "Argument contains forbidden character '{}'",
                    c.escape_default()
                ));
            }
        }

        let display = display_command(&program.display_name(), args);
        if !options.quiet {
            log::info!("Running: {}", display);
        }

        let mut cmd = Command::new(&program.executable);
        cmd.args(&program.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        #[cfg(target_os = "windows")]
        {
            use windows::Win32::System::Threading::CREATE_NO_WINDOW;
            cmd.creation_flags(CREATE_NO_WINDOW.0);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to spawn {}: {}", display, e);
                return ProcessResult {
                    success: false,
                    output: format!("Failed to start {}: {}", program.display_name(), e),
                    exit_code: EXIT_FAILURE,
                    duration_ms: elapsed_ms(start),
                };
            }
        };

        let pid = child.id();
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let (exit_code, timed_out, wait_error) =
            match tokio::time::timeout(options.timeout, child.wait()).await {
                Ok(Ok(status)) => (exit_code_of(status), false, None),
                Ok(Err(e)) => (EXIT_FAILURE, false, Some(e.to_string())),
                Err(_) => {
                    log::warn!(
                        "{} timed out after {}s, killing",
                        display,
                        options.timeout.as_secs()
                    );
                    if let Some(pid) = pid {
                        if let Err(e) = force_kill_tree(pid) {
                            log::warn!("{}", e);
                        }
                    }
                    if let Err(e) = child.kill().await {
                        log::debug!("Child already gone after timeout: {}", e);
                    }
                    (EXIT_TIMEOUT, true, None)
                }
            };
        let duration_ms = elapsed_ms(start);

        let stdout = tokio::time::timeout(READER_GRACE, stdout_task)
            .await
            .ok()
            .and_then(|joined| joined.ok())
            .unwrap_or_default();
        let stderr = tokio::time::timeout(READER_GRACE, stderr_task)
            .await
            .ok()
            .and_then(|joined| joined.ok())
            .unwrap_or_default();

        let mut output = join_output(&stdout, &stderr);
        if timed_out {
            append_line(
                &mut output,
                &format!("Process timed out after {} seconds", options.timeout.as_secs()),
            );
        }
        if let Some(e) = wait_error {
            append_line(&mut output, &format!("Failed to wait for process: {}", e));
        }

        let success = exit_code == 0 && !timed_out;
        if !options.quiet {
            log::info!(
                "Finished: {} (exit {}, {} ms)",
                display,
                exit_code,
                duration_ms
            );
        }

        ProcessResult {
            success,
            output,
            exit_code,
            duration_ms,
        }
    }
}
