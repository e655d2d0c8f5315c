// Modelgate: batching, caching and resource-aware dispatch in front of a model executable
pub mod breaker;
pub mod cache;
pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod file_manager;
pub mod jobs;
pub mod models;
pub mod performance;
pub mod pipeline;
pub mod planner;
pub mod process_manager;
pub mod serializer;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{EngineError, ErrorBody, ErrorKind};

use breaker::CircuitBreaker;
use cache::ResultCache;
use file_manager::{read_json_file, read_json_file_or_default};
use jobs::JobManager;
use log::info;
use models::{EngineSettings, InformationDocument, ModelCard, ModelDescriptor};
use performance::SysinfoSampler;
use pipeline::Engine;
use process_manager::{ModelRunner, SubprocessRunner};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use utils::{get_dir_size, get_scratch_root, BundleLayout};

/// Everything the command handlers share for one served model
pub struct AppState<R: ModelRunner = SubprocessRunner> {
    pub settings: EngineSettings,
    pub layout: BundleLayout,
    pub card: ModelCard,
    pub engine: Engine<R>,
    pub breaker: CircuitBreaker,
    pub jobs: Arc<JobManager>,
    // Scratch files of in-flight invocations live here until the state is dropped
    _scratch: Option<TempDir>,
}

impl<R: ModelRunner> AppState<R> {
    pub fn new(settings: EngineSettings, layout: BundleLayout, card: ModelCard, engine: Engine<R>) -> Self {
        Self {
            breaker: CircuitBreaker::from_settings(&settings),
            jobs: Arc::new(JobManager::new()),
            settings,
            layout,
            card,
            engine,
            _scratch: None,
        }
    }

    /// User-visible body for an error; tracebacks are withheld in production
    pub fn error_body(&self, err: &EngineError) -> ErrorBody {
        err.to_body(!self.settings.is_production())
    }
}

/// Load settings (`serving.json` then environment), the model card, and wire the
/// subprocess runner, Redis cache and sysinfo sampler together
pub fn initialize_app_state(layout: BundleLayout) -> Result<AppState, EngineError> {
    let mut settings: EngineSettings = read_json_file_or_default(&layout.settings_json_path())?;
    settings.apply_env();

    let document: InformationDocument = read_json_file(&layout.information_json_path())?;
    let card = document.card;
    let on_disk_bytes = get_dir_size(&layout.model_root());
    let descriptor = ModelDescriptor::from_card(&card, on_disk_bytes);

    let scratch_root = get_scratch_root();
    fs::create_dir_all(&scratch_root)?;
    let scratch = tempfile::Builder::new()
        .prefix("modelgate-")
        .tempdir_in(&scratch_root)?;

    let runner = Arc::new(SubprocessRunner::new(
        &layout,
        scratch.path(),
        settings.worker_env_var.clone(),
    ));
    let cache = ResultCache::from_settings(&settings);
    let engine = Engine::new(
        settings.clone(),
        descriptor,
        runner,
        cache,
        Arc::new(SysinfoSampler::new()),
        layout.example_output_path(),
    );

    info!(
        "Serving model {} ({} bytes on disk, variable output: {})",
        card.identifier,
        on_disk_bytes,
        engine.descriptor().is_variable
    );

    let mut state = AppState::new(settings, layout, card, engine);
    state._scratch = Some(scratch);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_information_document_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = initialize_app_state(BundleLayout::new(dir.path()));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_error_body_hides_traceback_in_prod() {
        let err = EngineError::EmptyData;
        let local = testing::test_bundle("Float");
        assert!(local.state.error_body(&err).traceback.is_some());

        let settings = EngineSettings {
            environment: "prod".to_string(),
            ..EngineSettings::default()
        };
        let prod = testing::test_bundle_with("Float", settings);
        let body = prod.state.error_body(&err);
        assert!(body.traceback.is_none());
        assert_eq!(body.detail, "Data is empty.");
    }
}
