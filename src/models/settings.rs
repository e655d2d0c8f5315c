// Engine settings data model
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// `prod` hides tracebacks from error bodies
    pub environment: String,
    pub redis_uri: String,
    /// Retention of cached rows and headers
    pub cache_ttl_secs: u64,
    pub cache_connect_timeout_ms: u64,
    /// Bound on each cache round trip; a silent server counts as unavailable
    pub cache_response_timeout_ms: u64,
    pub fail_max: u32,
    pub reset_timeout_secs: u64,
    /// Bound on the parallel aggregation wait
    pub timeout_secs: u64,
    pub max_cpu_percent: f32,
    pub max_mem_percent: f32,
    pub data_size_lowerbound: usize,
    pub data_size_upperbound: usize,
    pub resource_safety_margin: f64,
    pub model_threshold_fraction: f64,
    pub chunk_multiplier: usize,
    /// Batches smaller than `worker_count * thread_pool_factor` prefer the thread pool
    pub thread_pool_factor: usize,
    /// Environment variable through which each invocation learns the worker count
    pub worker_env_var: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            environment: String::from("local"),
            redis_uri: String::from("redis://localhost:6379"),
            cache_ttl_secs: 3600 * 24 * 7,
            cache_connect_timeout_ms: 500,
            cache_response_timeout_ms: 1000,
            fail_max: 100,
            reset_timeout_secs: 60,
            timeout_secs: 60,
            max_cpu_percent: 90.0,
            max_mem_percent: 90.0,
            data_size_lowerbound: 100,
            data_size_upperbound: 10_000,
            resource_safety_margin: 0.8,
            model_threshold_fraction: 0.13,
            chunk_multiplier: 4,
            thread_pool_factor: 10,
            worker_env_var: String::from("MODEL_NUM_WORKERS"),
        }
    }
}

impl EngineSettings {
    pub fn is_production(&self) -> bool {
        self.environment == "prod"
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("ENVIRONMENT") {
            self.environment = env;
        }
        if let Some(uri) = lookup("REDIS_URI") {
            self.redis_uri = uri;
        }
        override_parsed(&lookup, "REDIS_EXPIRATION", &mut self.cache_ttl_secs);
        override_parsed(&lookup, "REDIS_TIMEOUT_MS", &mut self.cache_response_timeout_ms);
        override_parsed(&lookup, "FAIL_MAX", &mut self.fail_max);
        override_parsed(&lookup, "RESET_TIMEOUT", &mut self.reset_timeout_secs);
        override_parsed(&lookup, "TIMEOUT", &mut self.timeout_secs);
        override_parsed(&lookup, "MAX_CPU_PERC", &mut self.max_cpu_percent);
        override_parsed(&lookup, "MAX_MEM_PERC", &mut self.max_mem_percent);
        override_parsed(&lookup, "DATA_SIZE_LOWERBOUND", &mut self.data_size_lowerbound);
        override_parsed(&lookup, "DATA_SIZE_UPPERBOUND", &mut self.data_size_upperbound);
        override_parsed(&lookup, "RESOURCE_SAFETY_MARGIN", &mut self.resource_safety_margin);
        override_parsed(&lookup, "MODEL_THRESHOLD_FRACTION", &mut self.model_threshold_fraction);
        override_parsed(&lookup, "CHUNK_MULTIPLIER", &mut self.chunk_multiplier);
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("Ignoring unparsable {}={:?}", name, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_serving_template() {
        let settings = EngineSettings::default();
        assert_eq!(settings.fail_max, 100);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(604_800));
        assert_eq!(settings.reset_timeout(), Duration::from_secs(60));
        assert_eq!(settings.data_size_lowerbound, 100);
        assert_eq!(settings.data_size_upperbound, 10_000);
        assert!(!settings.is_production());
    }

    #[test]
    fn test_env_overrides_skip_garbage() {
        let vars: HashMap<&str, &str> = [
            ("ENVIRONMENT", "prod"),
            ("FAIL_MAX", "5"),
            ("RESET_TIMEOUT", "not-a-number"),
            ("MODEL_THRESHOLD_FRACTION", "0.5"),
            ("REDIS_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();

        let mut settings = EngineSettings::default();
        settings.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert!(settings.is_production());
        assert_eq!(settings.fail_max, 5);
        assert_eq!(settings.reset_timeout_secs, 60);
        assert_eq!(settings.model_threshold_fraction, 0.5);
        assert_eq!(settings.cache_response_timeout_ms, 250);
    }

    #[test]
    fn test_partial_settings_file_keeps_defaults() {
        let settings: EngineSettings = serde_json::from_str(r#"{"fail_max": 3}"#).unwrap();
        assert_eq!(settings.fail_max, 3);
        assert_eq!(settings.chunk_multiplier, 4);
    }
}
