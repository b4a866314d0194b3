//! Stage runner.
//!
//! Executes one external invocation at a time and reports how it ended.
//!
//! ```text
//! Invocation → StageExecutor → child process → StageExit → StageOutcome
//! ```
//!
//! [`StageExecutor`] is the seam between the driver and the operating
//! system; tests substitute a recording executor for [`ProcessExecutor`].

pub mod executor;
pub mod result;

pub use executor::{ProcessExecutor, StageExecutor};
pub use result::{StageExit, StageOutcome, StageStatus};
