pub mod artisan;
pub mod commands;
pub mod composer;
pub mod config;
pub mod env_file;
mod error;
pub mod history;
pub mod inspect;
pub mod install;
pub mod ipc;
pub mod launch;
pub mod paths;
pub mod php;
#[cfg(feature = "tauri-plugin")]
pub mod plugin;
pub mod process;
pub mod shell_safety;
pub mod site;
#[cfg(test)]
mod testing;
pub mod validation;
pub mod whitelist;

use std::sync::Arc;

pub use commands::AddonState;
pub use error::{AppError, ErrorKind, Result};
pub use ipc::{Bridge, CHANNELS, CHANNEL_PREFIX};

/// Bridge over the default data directory (`~/.laravel_local_addon`).
pub fn default_bridge() -> Result<Bridge> {
    let data_dir = paths::get_data_dir();
    paths::ensure_data_dir(&data_dir)?;
    let state = AddonState::from_data_dir(data_dir)?;
    Ok(Bridge::new(Arc::new(state)))
}
