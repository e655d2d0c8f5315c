// Resource & strategy planning module
pub mod strategy;

pub use strategy::{split_chunks, PlannerThresholds, ResourcePlanner, WorkerBounds};
