// Live resource sampling
use crate::models::performance::ResourceSnapshot;
use log::debug;
use parking_lot::Mutex;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// Source of live resource figures.
/// Implementations must sample on every call; nothing is cached between plans.
pub trait ResourceSampler: Send + Sync {
    fn snapshot(&self) -> ResourceSnapshot;
}

/// Resource collector backed by sysinfo
/// Caches the core count (never changes at runtime)
pub struct ResourceCollector {
    system: System,
    cached_physical_cpus: usize,
}

impl ResourceCollector {
    pub fn new() -> Self {
        // Only cpu_usage is needed; frequency polling adds overhead per refresh
        let mut system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage())
                .with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_cpu();

        let logical = system.cpus().len().max(1);
        let cached_physical_cpus = system.physical_core_count().unwrap_or(logical).max(1);
        debug!(
            "Resource collector initialized: {} physical / {} logical cores",
            cached_physical_cpus, logical
        );

        Self {
            system,
            cached_physical_cpus,
        }
    }

    /// Refresh and collect. CPU usage covers the interval since the previous call.
    pub fn collect(&mut self) -> ResourceSnapshot {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let available = self.system.available_memory();
        let used = total.saturating_sub(available);

        let memory_percent = if total > 0 {
            (used as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };

        ResourceSnapshot {
            available_memory: available,
            total_memory: total,
            physical_cpus: self.cached_physical_cpus,
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            memory_percent,
        }
    }
}

impl Default for ResourceCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared sampler; one collector behind a lock so CPU deltas stay meaningful
pub struct SysinfoSampler {
    collector: Mutex<ResourceCollector>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            collector: Mutex::new(ResourceCollector::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn snapshot(&self) -> ResourceSnapshot {
        self.collector.lock().collect()
    }
}
