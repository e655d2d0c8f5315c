// Resource sampling data structures
use serde::{Deserialize, Serialize};

/// Live resource figures the planner and admission checks work from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Memory available for new allocations, in bytes
    pub available_memory: u64,
    /// Total system memory in bytes
    pub total_memory: u64,
    /// Physical core count (falls back to logical count when unknown)
    pub physical_cpus: usize,
    /// Overall CPU usage percentage (0-100)
    pub cpu_percent: f32,
    /// Memory usage percentage (0-100)
    pub memory_percent: f32,
}

impl Default for ResourceSnapshot {
    fn default() -> Self {
        Self {
            available_memory: 0,
            total_memory: 0,
            physical_cpus: 1,
            cpu_percent: 0.0,
            memory_percent: 0.0,
        }
    }
}

/// CPU/memory percentages reported by the health command
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemLoad {
    pub cpu: f32,
    pub memory: f32,
}

impl From<&ResourceSnapshot> for SystemLoad {
    fn from(snapshot: &ResourceSnapshot) -> Self {
        Self {
            cpu: snapshot.cpu_percent,
            memory: snapshot.memory_percent,
        }
    }
}
