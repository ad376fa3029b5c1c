//! Laravel site creation: stages, progress tracking and the orchestrator.

mod orchestrator;
mod progress;
mod types;

pub use orchestrator::{laravel_env, InstallOrchestrator};
pub use progress::{ProgressCallback, ProgressEvent, ProgressStore};
pub use types::{CreationProgress, InstallOptions, InstallStage, StarterKit};
