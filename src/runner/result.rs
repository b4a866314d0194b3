//! Outcomes of individual stage invocations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::stage::{Invocation, Phase, StageKind};

/// What a stage executor observed when the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageExit {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl StageExit {
    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signalled() -> Self {
        Self { code: None }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Status of a finished invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Exited with code 0.
    Succeeded,
    /// Exited non-zero or was killed by a signal.
    Failed,
    /// Exceeded the configured stage timeout.
    TimedOut,
    /// The program could not be started.
    SpawnFailed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Succeeded => write!(f, "succeeded"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::TimedOut => write!(f, "timed_out"),
            StageStatus::SpawnFailed => write!(f, "spawn_failed"),
        }
    }
}

/// Record of one invocation, as kept in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    #[serde(flatten)]
    pub phase: Phase,
    pub stage: StageKind,
    pub command_line: String,
    pub status: StageStatus,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl StageOutcome {
    fn new(invocation: &Invocation, status: StageStatus, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            phase: invocation.phase,
            stage: invocation.stage,
            command_line: invocation.command_line(),
            status,
            exit_code: None,
            duration,
            started_at: now - chrono::Duration::from_std(duration).unwrap_or_default(),
            error: None,
        }
    }

    /// Builds the outcome for a process that ran to an exit.
    pub fn exited(invocation: &Invocation, exit: StageExit, duration: Duration) -> Self {
        let status = if exit.is_success() {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };
        let mut outcome = Self::new(invocation, status, duration);
        outcome.exit_code = exit.code;
        if !exit.is_success() {
            outcome.error = Some(match exit.code {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            });
        }
        outcome
    }

    /// Builds the outcome for a process that failed without a usable exit status.
    pub fn failed(invocation: &Invocation, error: impl Into<String>, duration: Duration) -> Self {
        let mut outcome = Self::new(invocation, StageStatus::Failed, duration);
        outcome.error = Some(error.into());
        outcome
    }

    pub fn timed_out(invocation: &Invocation, duration: Duration) -> Self {
        let mut outcome = Self::new(invocation, StageStatus::TimedOut, duration);
        outcome.error = Some(format!("timed out after {:?}", duration));
        outcome
    }

    pub fn spawn_failed(invocation: &Invocation, error: impl Into<String>) -> Self {
        let mut outcome = Self::new(invocation, StageStatus::SpawnFailed, Duration::ZERO);
        outcome.error = Some(error.into());
        outcome
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// Human-readable failure reason, empty on success.
    pub fn reason(&self) -> String {
        self.error.clone().unwrap_or_default()
    }
}
