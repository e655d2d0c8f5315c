// Bundle layout and filesystem helpers
pub mod paths;

pub use paths::*;
