// Document reading helpers
pub mod csv_ops;
pub mod json_ops;

pub use csv_ops::*;
pub use json_ops::*;
