// Resource sampling module
pub mod collector;

pub use collector::{ResourceCollector, ResourceSampler, SysinfoSampler};
