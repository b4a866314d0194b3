//! Command-line interface for selfplay-pipeline.
//!
//! Provides commands to run the pipeline, print its schedule, and inspect
//! the kifu archive.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
