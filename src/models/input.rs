// Request-side data models
use serde::{Deserialize, Serialize};

/// A single prediction input.
///
/// A keyed item carries its own cache identity; a plain item is identified by its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputItem {
    Plain(String),
    Keyed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        input: String,
    },
}

impl InputItem {
    pub fn plain(value: impl Into<String>) -> Self {
        InputItem::Plain(value.into())
    }

    pub fn keyed(key: impl Into<String>, value: impl Into<String>) -> Self {
        InputItem::Keyed {
            key: Some(key.into()),
            input: value.into(),
        }
    }

    /// The value handed to the model
    pub fn value(&self) -> &str {
        match self {
            InputItem::Plain(value) => value,
            InputItem::Keyed { input, .. } => input,
        }
    }

    /// Caller-supplied cache identity, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            InputItem::Plain(_) => None,
            InputItem::Keyed { key, .. } => key.as_deref(),
        }
    }
}

/// JSON shape of a serialized result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orient {
    #[default]
    Records,
    Columns,
    Values,
    Split,
    Index,
}

/// Wire encoding used between the engine and the model executable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Simple,
    Heavy,
}

fn default_true() -> bool {
    true
}

fn default_min_workers() -> usize {
    1
}

fn default_run_max_workers() -> usize {
    16
}

fn default_job_max_workers() -> usize {
    12
}

/// Synchronous prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub inputs: Vec<InputItem>,
    #[serde(default)]
    pub orient: Orient,
    #[serde(default = "default_true")]
    pub fetch_cache: bool,
    #[serde(default = "default_true")]
    pub save_cache: bool,
    #[serde(default)]
    pub cache_only: bool,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_run_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub output_type: TaskType,
    /// Overrides the configured aggregation timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PredictRequest {
    pub fn new(inputs: Vec<InputItem>) -> Self {
        Self {
            inputs,
            orient: Orient::default(),
            fetch_cache: true,
            save_cache: true,
            cache_only: false,
            min_workers: default_min_workers(),
            max_workers: default_run_max_workers(),
            output_type: TaskType::default(),
            timeout_secs: None,
        }
    }
}

/// Asynchronous job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub inputs: Vec<InputItem>,
    #[serde(default)]
    pub orient: Orient,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_job_max_workers")]
    pub max_workers: usize,
}

impl JobRequest {
    pub fn new(inputs: Vec<InputItem>) -> Self {
        Self {
            inputs,
            orient: Orient::default(),
            min_workers: default_min_workers(),
            max_workers: default_job_max_workers(),
        }
    }
}

/// Per-call knobs of the cache -> plan -> dispatch pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub fetch_cache: bool,
    pub save_cache: bool,
    pub cache_only: bool,
    pub min_workers: usize,
    pub max_workers: usize,
    pub timeout_secs: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch_cache: true,
            save_cache: true,
            cache_only: false,
            min_workers: default_min_workers(),
            max_workers: default_run_max_workers(),
            timeout_secs: None,
        }
    }
}

impl From<&PredictRequest> for PipelineOptions {
    fn from(request: &PredictRequest) -> Self {
        Self {
            fetch_cache: request.fetch_cache,
            save_cache: request.save_cache,
            cache_only: request.cache_only,
            min_workers: request.min_workers,
            max_workers: request.max_workers,
            timeout_secs: request.timeout_secs,
        }
    }
}

impl From<&JobRequest> for PipelineOptions {
    fn from(request: &JobRequest) -> Self {
        Self {
            min_workers: request.min_workers,
            max_workers: request.max_workers,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_item_accepts_plain_and_keyed() {
        let items: Vec<InputItem> =
            serde_json::from_str(r#"["CCO", {"key": "k1", "input": "CCN"}, {"input": "O"}]"#).unwrap();

        assert_eq!(items[0], InputItem::plain("CCO"));
        assert_eq!(items[1].key(), Some("k1"));
        assert_eq!(items[1].value(), "CCN");
        assert_eq!(items[2].key(), None);
        assert_eq!(items[2].value(), "O");
    }

    #[test]
    fn test_predict_request_defaults() {
        let request: PredictRequest = serde_json::from_str(r#"{"inputs": ["CCO"]}"#).unwrap();
        assert!(request.fetch_cache);
        assert!(request.save_cache);
        assert!(!request.cache_only);
        assert_eq!(request.max_workers, 16);
        assert_eq!(request.orient, Orient::Records);
        assert_eq!(request.output_type, TaskType::Simple);
    }

    #[test]
    fn test_job_request_defaults_to_twelve_workers() {
        let request: JobRequest = serde_json::from_str(r#"{"inputs": ["CCO"], "orient": "values"}"#).unwrap();
        assert_eq!(request.max_workers, 12);
        assert_eq!(request.orient, Orient::Values);
    }
}
