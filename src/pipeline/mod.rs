//! Orchestration of the self-play reinforcement-learning loop.
//!
//! The pipeline sequences three external programs:
//!
//! - **Self-play**: generates kifu into the shared archive
//! - **Status**: reports on the most recent self-play results
//! - **Train**: consumes the archive and writes the reinforcement-learning model
//!
//! # Pipeline Flow
//!
//! 1. **Seed phase**: self-play from `model/sl-model.bin`, status, train
//! 2. **Loop phases**: 100 iterations of self-play from `model/rl-model.bin`,
//!    status, train
//!
//! Stages never overlap: each one is awaited before the next is spawned.
//! Nothing passes between stages except the archive directory and the model
//! files on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use selfplay_pipeline::pipeline::{FailurePolicy, PipelineConfig, PipelineDriver};
//!
//! let config = PipelineConfig::new()
//!     .with_iterations(10)
//!     .with_failure_policy(FailurePolicy::Continue)
//!     .with_report_path("reports/run.json");
//!
//! let driver = PipelineDriver::new(config)?;
//! let report = driver.run().await?;
//!
//! println!("{} invocations, {} failed", report.stats.invocations, report.stats.failed);
//! ```
//!
//! # Failure Handling
//!
//! With [`FailurePolicy::FailFast`] (the default) the first failed stage stops
//! the run and is reported with its phase and stage. With
//! [`FailurePolicy::Continue`] failures are logged and counted, and the
//! schedule runs to the end regardless.

pub mod config;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod stage;

// Re-export main types for convenience
pub use config::{FailurePolicy, PipelineConfig};
pub use orchestrator::PipelineDriver;
pub use plan::PipelinePlan;
pub use report::{PipelineStats, RunReport};
pub use stage::{Invocation, Phase, StageCommand, StageKind};
