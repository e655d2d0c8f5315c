// Health report data structures
use super::performance::SystemLoad;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub failures: u32,
    /// Unix timestamp (seconds) of the last counted failure
    pub last_failure: Option<f64>,
    pub reset_timeout: u64,
    /// Unix timestamp (seconds) at which an open breaker admits a trial call
    pub next_reset: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub breaker: BreakerStatus,
    pub system: SystemLoad,
}
