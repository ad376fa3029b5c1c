//! Recently run Artisan commands, kept in the addon config.

use crate::config::ConfigStore;
use crate::error::Result;

pub const MAX_HISTORY: usize = 20;

/// Move `entry` to the front, dropping duplicates and anything past the cap.
pub fn push_entry(history: &mut Vec<String>, entry: &str) {
    let entry = entry.trim();
    if entry.is_empty() {
        return;
    }
    history.retain(|existing| existing != entry);
    history.insert(0, entry.to_string());
    history.truncate(MAX_HISTORY);
}

pub fn record(store: &ConfigStore, command: &[String]) -> Result<()> {
    let entry = command.join(" ");
    store.with_config_mut(|config| {
        push_entry(&mut config.command_history, &entry);
        Ok(())
    })
}

pub fn list(store: &ConfigStore) -> Vec<String> {
    store.load().command_history.clone()
}

pub fn clear(store: &ConfigStore) -> Result<()> {
    store.with_config_mut(|config| {
        config.command_history.clear();
        Ok(())
    })
}
