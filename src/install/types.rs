use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation::{CreateSiteRequest, Validate};

/// Site creation stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Initializing,
    Provisioning,
    InstallingDependencies,
    CreatingProject,
    ConfiguringEnv,
    RunningMigrations,
    Finalizing,
    Complete,
    Error,
}

impl InstallStage {
    /// Fixed progress percentage on entering the stage; `-1` for `Error`.
    pub fn progress(self) -> i32 {
        match self {
            Self::Initializing => 0,
            Self::Provisioning => 10,
            Self::InstallingDependencies => 20,
            Self::CreatingProject => 30,
            Self::ConfiguringEnv => 50,
            Self::RunningMigrations => 65,
            Self::Finalizing => 80,
            Self::Complete => 100,
            Self::Error => -1,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarterKit {
    None,
    Breeze {
        stack: String,
        dark_mode: bool,
        pest: bool,
    },
    Jetstream {
        stack: String,
        teams: bool,
        api: bool,
        verification: bool,
        pest: bool,
    },
}

impl StarterKit {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Breeze { .. } => "breeze",
            Self::Jetstream { .. } => "jetstream",
        }
    }

    /// Composer package providing the kit.
    pub fn package(&self) -> Option<String> {
        match self {
            Self::None => None,
            _ => Some(format!("laravel/{}", self.name())),
        }
    }

    /// Arguments for the kit's `<kit>:install` Artisan command.
    pub fn install_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Self::None => return args,
            Self::Breeze {
                stack,
                dark_mode,
                pest,
            } => {
                args.push("breeze:install".to_string());
                args.push(stack.clone());
                if *dark_mode {
                    args.push("--dark".to_string());
                }
                if *pest {
                    args.push("--pest".to_string());
                }
            }
            Self::Jetstream {
                stack,
                teams,
                api,
                verification,
                pest,
            } => {
                args.push("jetstream:install".to_string());
                args.push(stack.clone());
                for (enabled, flag) in [
                    (*teams, "--teams"),
                    (*api, "--api"),
                    (*verification, "--verification"),
                    (*pest, "--pest"),
                ] {
                    if enabled {
                        args.push(flag.to_string());
                    }
                }
            }
        }
        args.push("--no-interaction".to_string());
        args
    }
}

/// Validated parameters for one site creation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub laravel_version: String,
    pub php_version: Option<String>,
    pub starter_kit: StarterKit,
    pub build_assets: bool,
}

impl InstallOptions {
    /// Validate the request and turn it into install options.
    pub fn from_request(request: &CreateSiteRequest) -> Result<Self> {
        request.validate()?;

        let pest = request.pest.unwrap_or(false);
        let starter_kit = match request.starter_kit.as_deref() {
            Some("breeze") => StarterKit::Breeze {
                stack: request.breeze_stack.clone().unwrap_or_default(),
                dark_mode: request.breeze_dark_mode.unwrap_or(false),
                pest,
            },
            Some("jetstream") => StarterKit::Jetstream {
                stack: request.jetstream_stack.clone().unwrap_or_default(),
                teams: request.jetstream_teams.unwrap_or(false),
                api: request.jetstream_api.unwrap_or(false),
                verification: request.jetstream_verification.unwrap_or(false),
                pest,
            },
            _ => StarterKit::None,
        };
        // Kits ship frontend scaffolding that is useless unbuilt.
        let build_assets = request
            .build_assets
            .unwrap_or(starter_kit != StarterKit::None);

        Ok(Self {
            laravel_version: request.version.clone(),
            php_version: request.php_version.clone(),
            starter_kit,
            build_assets,
        })
    }
}

/// Snapshot of a site creation run as the UI polls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationProgress {
    pub progress: i32,
    pub stage: InstallStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreationProgress {
    pub fn at(stage: InstallStage, message: impl Into<String>) -> Self {
        Self::with_progress(stage, stage.progress(), message)
    }

    pub fn with_progress(stage: InstallStage, progress: i32, message: impl Into<String>) -> Self {
        Self {
            progress,
            stage,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            progress: InstallStage::Error.progress(),
            stage: InstallStage::Error,
            message: format!("Site creation failed: {}", error),
            error: Some(error),
        }
    }
}

impl Default for CreationProgress {
    fn default() -> Self {
        Self::at(InstallStage::Initializing, "Waiting to start")
    }
}
