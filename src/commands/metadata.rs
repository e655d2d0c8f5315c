// Model metadata

use crate::models::model_info::ModelCard;
use crate::process_manager::ModelRunner;
use crate::AppState;
use serde_json::{json, Value};

pub fn card<R: ModelRunner>(state: &AppState<R>) -> ModelCard {
    state.card.clone()
}

pub fn model_info<R: ModelRunner>(state: &AppState<R>) -> Value {
    let descriptor = state.engine.descriptor();
    json!({
        "identifier": state.card.identifier,
        "slug": state.card.slug,
        "output_types": descriptor.output_types,
        "is_variable": descriptor.is_variable,
        "on_disk_bytes": descriptor.on_disk_bytes,
    })
}
