//! Error types for selfplay-pipeline operations.
//!
//! Defines the error types for each subsystem:
//! - Configuration loading and validation
//! - External stage invocation
//! - Pipeline orchestration

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::stage::{Phase, StageKind};

/// Errors that can occur while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors produced while invoking a single external stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process error while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A stage failed under the fail-fast policy.
    #[error("{stage} failed during {phase}: {reason}")]
    StageFailed {
        phase: Phase,
        stage: StageKind,
        reason: String,
    },

    /// The run was interrupted while a stage was in flight.
    #[error("Interrupted during {phase} while running {stage}")]
    Interrupted { phase: Phase, stage: StageKind },

    #[error("Failed to write run report '{path}': {message}")]
    Report { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
