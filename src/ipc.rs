//! Channel dispatch between the UI and the handlers.
//!
//! Every reply is JSON. Failures are turned into
//! `{ success: false, error, code, kind, messages }` here and nowhere else.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::commands::{self, AddonState};
use crate::error::{AppError, Result};
use crate::launch::LaunchTarget;

pub const CHANNEL_PREFIX: &str = "laravel-local";

pub const CHANNELS: &[&str] = &[
    "create-site",
    "get-creation-status",
    "is-laravel-site",
    "get-sites",
    "get-info",
    "run-command",
    "get-env",
    "update-env",
    "queue-failed",
    "queue-retry",
    "queue-forget",
    "queue-flush",
    "get-logs",
    "get-history",
    "clear-history",
    "open-folder",
    "open-shell",
    "open-editor",
];

/// Fully qualified channel name, e.g. `laravel-local:get-env`.
pub fn channel_name(channel: &str) -> String {
    format!("{}:{}", CHANNEL_PREFIX, channel)
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T> {
    // Handlers without arguments accept a missing payload.
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload)
        .map_err(|e| AppError::validation(vec![format!("Invalid payload: {}", e)]))
}

fn reply<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn ok() -> Result<Value> {
    Ok(json!({ "success": true }))
}

pub fn error_response(error: &AppError) -> Value {
    json!({
        "success": false,
        "error": error.user_message(),
        "code": error.kind().code(),
        "kind": error.kind(),
        "messages": error.messages(),
    })
}

#[derive(Clone)]
pub struct Bridge {
    state: Arc<AddonState>,
}

impl Bridge {
    pub fn new(state: Arc<AddonState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AddonState> {
        &self.state
    }

    /// Handle one message. Accepts the channel with or without its prefix.
    pub async fn invoke(&self, channel: &str, payload: Value) -> Value {
        let name = channel
            .strip_prefix(CHANNEL_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(channel);

        match self.dispatch(name, payload).await {
            Ok(value) => value,
            Err(e) => {
                if e.is_rejection() {
                    log::warn!("Rejected {}: {}", name, e);
                } else {
                    log::error!("{} failed: {}", name, e);
                }
                error_response(&e)
            }
        }
    }

    async fn dispatch(&self, channel: &str, payload: Value) -> Result<Value> {
        let state = self.state.as_ref();
        match channel {
            "create-site" => reply(commands::create_site(state, parse(payload)?)?),
            "get-creation-status" => reply(commands::get_creation_status(state, &parse(payload)?)?),
            "is-laravel-site" => reply(commands::is_laravel_site(state, &parse(payload)?)?),
            "get-sites" => reply(commands::get_sites(state)?),
            "get-info" => reply(commands::get_info(state, &parse(payload)?)?),
            "run-command" => reply(commands::run_command(state, parse(payload)?).await?),
            "get-env" => reply(commands::get_env(state, &parse(payload)?)?),
            "update-env" => {
                commands::update_env(state, &parse(payload)?)?;
                ok()
            }
            "queue-failed" => reply(commands::queue_failed(state, &parse(payload)?).await?),
            "queue-retry" => reply(commands::queue_retry(state, &parse(payload)?).await?),
            "queue-forget" => reply(commands::queue_forget(state, &parse(payload)?).await?),
            "queue-flush" => reply(commands::queue_flush(state, &parse(payload)?).await?),
            "get-logs" => reply(commands::get_logs(state, &parse(payload)?)?),
            "get-history" => reply(commands::get_history(state)),
            "clear-history" => {
                commands::clear_history(state)?;
                ok()
            }
            "open-folder" => {
                commands::open_site(state, &parse(payload)?, LaunchTarget::Folder)?;
                ok()
            }
            "open-shell" => {
                commands::open_site(state, &parse(payload)?, LaunchTarget::Shell)?;
                ok()
            }
            "open-editor" => {
                commands::open_site(state, &parse(payload)?, LaunchTarget::Editor)?;
                ok()
            }
            other => Err(AppError::unknown_channel(other)),
        }
    }
}
