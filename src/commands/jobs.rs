// Asynchronous prediction jobs

use crate::error::EngineError;
use crate::models::input::{JobRequest, PipelineOptions};
use crate::models::job::{JobResultView, JobStatusView, JobSubmitted};
use crate::process_manager::ModelRunner;
use crate::serializer::orient_to_json;
use crate::AppState;
use log::{debug, warn};
use std::sync::Arc;

/// Validate and enqueue a job; the returned id is usable immediately
pub fn submit_job<R: ModelRunner>(
    state: &Arc<AppState<R>>,
    request: JobRequest,
) -> Result<JobSubmitted, EngineError> {
    if request.inputs.is_empty() {
        return Err(EngineError::EmptyRequest);
    }

    let worker_state = Arc::clone(state);
    let job_id = state.jobs.submit(move |tag| async move {
        let state = worker_state;
        let opts = PipelineOptions::from(&request);
        let prediction = state
            .breaker
            .call(|| state.engine.predict(&request.inputs, &tag, &opts))
            .await?;

        let index: Vec<String> = request.inputs.iter().map(|item| item.value().to_string()).collect();
        Ok(orient_to_json(
            &prediction.rows,
            &prediction.header,
            &index,
            request.orient,
            state.engine.descriptor().effective_output_type(),
        ))
    })?;

    debug!("Submitted job {}", job_id);
    Ok(JobSubmitted {
        job_id,
        message: "Job submitted successfully".to_string(),
    })
}

pub fn job_status<R: ModelRunner>(state: &AppState<R>, job_id: &str) -> Result<JobStatusView, EngineError> {
    state.jobs.status(job_id)
}

pub fn job_result<R: ModelRunner>(state: &AppState<R>, job_id: &str) -> Result<JobResultView, EngineError> {
    state.jobs.result(job_id)
}

// TODO: gate behind admin authorization once the serving layer carries credentials
pub fn reset_jobs<R: ModelRunner>(state: &AppState<R>) -> serde_json::Value {
    let cleared = state.jobs.reset();
    warn!("Job store reset, {} jobs dropped", cleared);
    serde_json::json!({ "message": "All jobs have been reset", "cleared": cleared })
}
