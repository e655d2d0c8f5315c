// Command handlers - one file per domain
pub mod health;
pub mod jobs;
pub mod metadata;
pub mod run;
