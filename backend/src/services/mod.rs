//! HTTP surface of the pipeline.

use crate::config::AppConfig;
use crate::job_controller::registry::JobRegistry;
use crate::job_controller::runner::JobRunner;
use crate::storage::FileStorage;

pub mod students;

/// Shared application state, injected into every handler as `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub registry: JobRegistry,
    pub runner: JobRunner,
    pub storage: FileStorage,
    pub config: AppConfig,
}
