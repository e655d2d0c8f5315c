// Data models (structs)
pub mod health;
pub mod input;
pub mod job;
pub mod model_info;
pub mod performance;
pub mod plan;
pub mod settings;

pub use health::*;
pub use input::*;
pub use job::*;
pub use model_info::*;
pub use performance::*;
pub use plan::*;
pub use settings::*;
