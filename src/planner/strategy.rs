// Resource-aware worker sizing and execution strategy selection
// Pure functions of their inputs: the caller samples live metrics once per plan

use crate::models::model_info::ModelDescriptor;
use crate::models::performance::ResourceSnapshot;
use crate::models::plan::{Chunk, ExecutionMode, ExecutionPlan};
use crate::models::settings::EngineSettings;
use log::debug;

/// Tunables of the planner
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerThresholds {
    pub safety_margin: f64,
    pub model_threshold_fraction: f64,
    pub data_size_lowerbound: usize,
    pub data_size_upperbound: usize,
    pub chunk_multiplier: usize,
    pub thread_pool_factor: usize,
}

impl Default for PlannerThresholds {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for PlannerThresholds {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            safety_margin: settings.resource_safety_margin,
            model_threshold_fraction: settings.model_threshold_fraction,
            data_size_lowerbound: settings.data_size_lowerbound,
            data_size_upperbound: settings.data_size_upperbound,
            chunk_multiplier: settings.chunk_multiplier.max(1),
            thread_pool_factor: settings.thread_pool_factor,
        }
    }
}

/// Caller-supplied worker limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerBounds {
    pub min_workers: usize,
    pub max_workers: usize,
}

impl WorkerBounds {
    pub fn new(min_workers: usize, max_workers: usize) -> Self {
        Self {
            min_workers: min_workers.max(1),
            max_workers: max_workers.max(1),
        }
    }
}

pub struct ResourcePlanner {
    thresholds: PlannerThresholds,
}

impl ResourcePlanner {
    pub fn new(thresholds: PlannerThresholds) -> Self {
        Self { thresholds }
    }

    /// Number of workers the batch may use given memory, cores and the caller's bounds
    pub fn worker_count(
        &self,
        batch_size: usize,
        bounds: WorkerBounds,
        snapshot: &ResourceSnapshot,
        model_bytes: u64,
    ) -> usize {
        let mem_budget = (snapshot.available_memory as f64 * self.thresholds.safety_margin) as u64;
        let by_memory = ((mem_budget / model_bytes.max(1)) as usize).max(1);
        // One core stays with the dispatcher
        let by_cpu = snapshot.physical_cpus.saturating_sub(1).max(1);
        let by_data = batch_size.max(1);

        let mut workers = bounds.max_workers.min(by_memory).min(by_cpu).min(by_data);
        workers = workers.max(bounds.min_workers);
        if batch_size > 0 {
            workers = workers.min(batch_size);
        }
        workers
    }

    /// Model footprint above which even modest batches justify parallel dispatch
    pub fn model_size_threshold(&self, snapshot: &ResourceSnapshot) -> f64 {
        self.thresholds.model_threshold_fraction * snapshot.total_memory as f64
    }

    pub fn is_parallel_amenable(
        &self,
        batch_size: usize,
        descriptor: &ModelDescriptor,
        snapshot: &ResourceSnapshot,
    ) -> bool {
        if descriptor.is_variable {
            return true;
        }
        let threshold = self.model_size_threshold(snapshot);
        let model_bytes = descriptor.on_disk_bytes as f64;

        if model_bytes > threshold {
            batch_size >= self.thresholds.data_size_lowerbound
        } else {
            batch_size >= self.thresholds.data_size_upperbound
        }
    }

    /// Pool flavor for a parallel batch
    pub fn select_mode(&self, batch_size: usize, workers: usize, descriptor: &ModelDescriptor) -> ExecutionMode {
        if !descriptor.is_variable && batch_size < workers * self.thresholds.thread_pool_factor {
            ExecutionMode::Thread
        } else {
            ExecutionMode::Process
        }
    }

    /// Build the execution plan for a batch
    pub fn plan(
        &self,
        items: Vec<String>,
        base_tag: &str,
        bounds: WorkerBounds,
        descriptor: &ModelDescriptor,
        snapshot: &ResourceSnapshot,
    ) -> ExecutionPlan {
        let n = items.len();

        if !self.is_parallel_amenable(n, descriptor, snapshot) {
            debug!("Plan for {}: sequential, {} items", base_tag, n);
            return ExecutionPlan {
                worker_count: 1,
                mode: ExecutionMode::Sequential,
                chunks: vec![Chunk::new(0, base_tag, items)],
            };
        }

        let worker_count = self.worker_count(n, bounds, snapshot, descriptor.on_disk_bytes);
        let mode = self.select_mode(n, worker_count, descriptor);
        let chunk_count = n.min(worker_count * self.thresholds.chunk_multiplier);
        let chunks = split_chunks(items, chunk_count, base_tag);

        debug!(
            "Plan for {}: {:?} with {} workers, {} chunks, {} items",
            base_tag,
            mode,
            worker_count,
            chunks.len(),
            n
        );

        ExecutionPlan {
            worker_count,
            mode,
            chunks,
        }
    }
}

impl Default for ResourcePlanner {
    fn default() -> Self {
        Self::new(PlannerThresholds::default())
    }
}

/// Split into `chunk_count` contiguous chunks; earlier chunks absorb the remainder
pub fn split_chunks(items: Vec<String>, chunk_count: usize, base_tag: &str) -> Vec<Chunk> {
    if chunk_count <= 1 || items.is_empty() {
        return vec![Chunk::new(0, base_tag, items)];
    }

    let base = items.len() / chunk_count;
    let remainder = items.len() % chunk_count;
    let mut rest = items.into_iter();

    (0..chunk_count)
        .map(|index| {
            let size = base + usize::from(index < remainder);
            let slice: Vec<String> = rest.by_ref().take(size).collect();
            Chunk::new(index, base_tag, slice)
        })
        .collect()
}
