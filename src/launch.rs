//! Opening a site in the file manager, a terminal or an editor.
//!
//! Each launcher is a list of candidate argument vectors tried in order; the
//! first one that spawns wins. The child is not waited on.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl LaunchCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
        }
    }

    fn with_path(program: &str, leading: &[&str], dir: &Path) -> Self {
        let mut cmd = Self::new(program, leading);
        cmd.args.push(dir.display().to_string());
        cmd
    }

    fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchTarget {
    Folder,
    Shell,
    Editor,
}

pub fn folder_commands(dir: &Path) -> Vec<LaunchCommand> {
    if cfg!(target_os = "macos") {
        vec![LaunchCommand::with_path("open", &[], dir)]
    } else if cfg!(target_os = "windows") {
        vec![LaunchCommand::with_path("explorer", &[], dir)]
    } else {
        vec![LaunchCommand::with_path("xdg-open", &[], dir)]
    }
}

pub fn shell_commands(dir: &Path) -> Vec<LaunchCommand> {
    if cfg!(target_os = "macos") {
        vec![LaunchCommand::with_path("open", &["-a", "Terminal"], dir)]
    } else if cfg!(target_os = "windows") {
        vec![
            LaunchCommand::with_path("wt", &["-d"], dir),
            LaunchCommand::new("powershell", &["-NoExit"]).in_dir(dir),
        ]
    } else {
        let working_dir = format!("--working-directory={}", dir.display());
        vec![
            LaunchCommand::new("x-terminal-emulator", &[]).in_dir(dir),
            LaunchCommand::new("gnome-terminal", &[working_dir.as_str()]),
            LaunchCommand::with_path("konsole", &["--workdir"], dir),
            LaunchCommand::new("xterm", &[]).in_dir(dir),
        ]
    }
}

/// The configured editor first, then VS Code, then the file manager.
pub fn editor_commands(dir: &Path, editor: &str) -> Vec<LaunchCommand> {
    let mut commands = Vec::new();
    let editor = editor.trim();
    if !editor.is_empty() {
        commands.push(LaunchCommand::with_path(editor, &[], dir));
    }
    commands.push(LaunchCommand::with_path("code", &[], dir));
    commands.extend(folder_commands(dir));
    commands
}

fn spawn_detached(command: &LaunchCommand) -> std::io::Result<()> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }

    #[cfg(target_os = "windows")]
    {
        use windows::Win32::System::Threading::CREATE_NEW_CONSOLE;
        if command.program == "powershell" {
            cmd.creation_flags(CREATE_NEW_CONSOLE.0);
        }
    }

    cmd.spawn().map(|_| ())
}

/// Open `dir` with the first launcher candidate that starts.
pub fn open(target: LaunchTarget, dir: &Path, editor: &str) -> Result<()> {
    if !dir.is_dir() {
        return Err(AppError::io(format!("Directory does not exist: {:?}", dir)));
    }
    let candidates = match target {
        LaunchTarget::Folder => folder_commands(dir),
        LaunchTarget::Shell => shell_commands(dir),
        LaunchTarget::Editor => editor_commands(dir, editor),
    };

    let mut last_error = None;
    for candidate in &candidates {
        match spawn_detached(candidate) {
            Ok(()) => {
                log::info!("Opened {:?} with {}", dir, candidate.program);
                return Ok(());
            }
            Err(e) => {
                log::debug!("Launcher {} unavailable: {}", candidate.program, e);
                last_error = Some(e);
            }
        }
    }

    Err(AppError::process(format!(
        "No launcher could open {:?}: {}",
        dir,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}
