//! Background worker: environment configuration and the job scheduler.

pub mod config;
pub mod jobs;

pub use config::{WorkerConfig, WorkerConfigError};
