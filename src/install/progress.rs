use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use super::types::CreationProgress;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub site_id: String,
    #[serde(flatten)]
    pub progress: CreationProgress,
}

/// Receives every progress record of a creation run, keyed by site id.
pub type ProgressCallback = Arc<dyn Fn(&str, CreationProgress) + Send + Sync>;

/// Creation progress per site, polled by the UI and broadcast to listeners.
pub struct ProgressStore {
    entries: RwLock<HashMap<String, CreationProgress>>,
    events: broadcast::Sender<ProgressEvent>,
    retention: Duration,
}

impl ProgressStore {
    /// Terminal records are dropped `retention` after they were written.
    pub fn new(retention: Duration) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
            retention,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Current record, or the initial one for ids without a run.
    pub fn get(&self, site_id: &str) -> CreationProgress {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(site_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn update(self: &Arc<Self>, site_id: &str, progress: CreationProgress) {
        let terminal = progress.stage.is_terminal();
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(site_id.to_string(), progress.clone());

        let _ = self.events.send(ProgressEvent {
            site_id: site_id.to_string(),
            progress: progress.clone(),
        });

        if terminal {
            self.schedule_removal(site_id.to_string(), progress);
        }
    }

    /// Callback that stores and broadcasts every record it is given.
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let store = Arc::clone(self);
        Arc::new(move |site_id: &str, progress: CreationProgress| store.update(site_id, progress))
    }

    fn schedule_removal(self: &Arc<Self>, site_id: String, snapshot: CreationProgress) {
        let store = Arc::clone(self);
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let mut entries = store.entries.write().unwrap_or_else(|e| e.into_inner());
            // A new run may have started for the same id in the meantime.
            if entries.get(&site_id) == Some(&snapshot) {
                entries.remove(&site_id);
            }
        });
    }
}
