// Asynchronous prediction jobs
// Jobs live in memory only; status moves Pending -> Completed | Failed exactly once

use crate::error::EngineError;
use crate::models::job::{Job, JobResultView, JobStatus, JobStatusView};
use log::{debug, warn};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Default)]
pub struct JobManager {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job and return its id
    pub fn create(&self) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        self.jobs.write().insert(job_id.clone(), Job::new(job_id.clone()));
        debug!("Created job {}", job_id);
        job_id
    }

    /// Create a job and spawn the future `work` builds for it.
    /// `work` receives the job id, which doubles as the request tag.
    pub fn submit<F, Fut>(self: &Arc<Self>, work: F) -> Result<String, EngineError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Config(format!("Job submission needs a tokio runtime: {}", e)))?;

        let job_id = self.create();
        let jobs = Arc::clone(self);
        let id = job_id.clone();
        let outcome = work(job_id.clone());

        handle.spawn(async move {
            match outcome.await {
                Ok(result) => jobs.complete(&id, result),
                Err(e) => jobs.fail(&id, e.to_string()),
            }
        });

        Ok(job_id)
    }

    pub fn complete(&self, job_id: &str, result: Value) {
        self.finish(job_id, JobStatus::Completed, result, None);
    }

    /// Failed jobs keep `{"error": message}` as their stored result
    pub fn fail(&self, job_id: &str, error: String) {
        warn!("Job {} failed: {}", job_id, error);
        self.finish(job_id, JobStatus::Failed, json!({ "error": error }), Some(error));
    }

    fn finish(&self, job_id: &str, status: JobStatus, result: Value, error: Option<String>) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(job_id) else {
            debug!("Dropping outcome of unknown job {}", job_id);
            return;
        };
        if job.status.is_terminal() {
            debug!("Job {} already {:?}, ignoring {:?}", job_id, job.status, status);
            return;
        }
        job.status = status;
        job.result = Some(result);
        job.error = error;
        job.completed_at = Some(chrono::Utc::now().to_rfc3339());
        debug!("Job {} -> {:?}", job_id, status);
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusView, EngineError> {
        let jobs = self.jobs.read();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        Ok(JobStatusView {
            job_id: job.id.clone(),
            status: job.status,
        })
    }

    /// The payload is only exposed once the job completed successfully
    pub fn result(&self, job_id: &str) -> Result<JobResultView, EngineError> {
        let jobs = self.jobs.read();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        Ok(JobResultView {
            job_id: job.id.clone(),
            status: job.status,
            result: match job.status {
                JobStatus::Completed => job.result.clone(),
                _ => None,
            },
            error: job.error.clone(),
        })
    }

    /// Forget every job; returns how many were dropped
    pub fn reset(&self) -> usize {
        let mut jobs = self.jobs.write();
        let count = jobs.len();
        jobs.clear();
        count
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}
