//! Tauri plugin exposing the message bridge to the host's webview.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter as _, Manager as _, Runtime, State};
use tauri_plugin_log::{Target, TargetKind};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::AddonState;
use crate::error::Result;
use crate::ipc::{channel_name, Bridge, CHANNEL_PREFIX};

/// Event carrying every creation progress update.
pub const PROGRESS_EVENT: &str = "creation-progress";

#[tauri::command]
async fn invoke(channel: String, payload: Option<Value>, bridge: State<'_, Bridge>) -> Result<Value> {
    Ok(bridge.invoke(&channel, payload.unwrap_or(Value::Null)).await)
}

fn forward_progress<R: Runtime>(app: AppHandle<R>, bridge: &Bridge) {
    let mut rx = bridge.state().progress.subscribe();
    let event_name = channel_name(PROGRESS_EVENT);

    tauri::async_runtime::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let _ = app.emit(&event_name, &event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Progress listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Log plugin with the targets the addon writes to.
pub fn log_plugin<R: Runtime>() -> TauriPlugin<R> {
    tauri_plugin_log::Builder::new()
        .targets([
            Target::new(TargetKind::Stdout),
            Target::new(TargetKind::Webview),
            Target::new(TargetKind::LogDir {
                file_name: Some("laravel-local-addon".to_string()),
            }),
        ])
        .level(log::LevelFilter::Info)
        .build()
}

/// The addon plugin. `data_dir` holds `config.toml`.
pub fn init<R: Runtime>(data_dir: PathBuf) -> TauriPlugin<R> {
    Builder::new(CHANNEL_PREFIX)
        .invoke_handler(tauri::generate_handler![invoke])
        .setup(move |app, _api| {
            let state = AddonState::from_data_dir(data_dir.clone())?;
            let bridge = Bridge::new(Arc::new(state));
            forward_progress(app.clone(), &bridge);
            app.manage(bridge);
            log::info!("Laravel addon registered");
            Ok(())
        })
        .build()
}
