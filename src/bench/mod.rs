//! Load generation around the pipelined connection
//!
//! Workers share nothing but the outcome [`Counters`] and a stop flag. The
//! [`Benchmark`] runner owns both, drives the warmup and measurement phases
//! and turns the periodic samples into a [`Summary`].

pub mod config;
pub mod counters;
pub mod runner;
pub mod stats;
pub mod worker;

pub use config::{BenchConfig, BenchConfigBuilder, ConfigError};
pub use counters::{classify, Counters, Outcome, Snapshot};
pub use runner::Benchmark;
pub use stats::{Sampler, Summary};
pub use worker::{Worker, WorkerStats};

/// Result type for benchmark runs
pub type Result<T> = std::result::Result<T, Error>;

/// Benchmark errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
