//! selfplay-pipeline: driver for an iterative self-play reinforcement-learning loop.
//!
//! This library sequences the external self-play generator, status extractor,
//! and trainer through a seed phase and a fixed number of loop iterations.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod storage;

// Re-export commonly used error types
pub use error::{ConfigError, PipelineError, StageError};
