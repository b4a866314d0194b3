//! Stage executors.
//!
//! [`ProcessExecutor`] spawns the external programs. Their stdout and stderr
//! are inherited so the collaborators' own output reaches the terminal as-is.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::StageError;
use crate::pipeline::stage::Invocation;

use super::result::StageExit;

/// Runs a single stage invocation to completion.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs `invocation` and waits for it to exit.
    ///
    /// Dropping the returned future must stop the invocation.
    async fn execute(&self, invocation: &Invocation) -> Result<StageExit, StageError>;
}

/// Executor backed by real child processes.
pub struct ProcessExecutor {
    /// Directory the programs run in.
    work_dir: PathBuf,
    /// Optional per-stage timeout.
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout: None,
        }
    }

    /// Sets the per-stage timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl StageExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<StageExit, StageError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(
            "Spawning {} in {}",
            invocation.command_line(),
            self.work_dir.display()
        );

        let mut child = cmd.spawn().map_err(|source| StageError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let waited = match self.timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, child.wait()).await;
                match timed {
                    Ok(waited) => waited,
                    Err(_) => {
                        warn!("{} exceeded {:?}, killing it", invocation.stage, limit);
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill {}: {}", invocation.program, e);
                        }
                        return Err(StageError::Timeout(limit));
                    }
                }
            }
            None => child.wait().await,
        };

        let status = waited.map_err(|source| StageError::Wait {
            program: invocation.program.clone(),
            source,
        })?;

        Ok(StageExit { code: status.code() })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::stage::{Phase, StageCommand, StageKind};
    use tempfile::TempDir;

    fn invocation(program: &str, args: &[&str]) -> Invocation {
        let mut command = StageCommand::new(program);
        for arg in args {
            command = command.with_arg(*arg);
        }
        Invocation::from_command(Phase::Seed, StageKind::Status, &command)
    }

    #[tokio::test]
    async fn test_exit_codes_are_reported() {
        let temp = TempDir::new().unwrap();
        let executor = ProcessExecutor::new(temp.path());

        let ok = executor.execute(&invocation("true", &[])).await.unwrap();
        assert!(ok.is_success());

        let failed = executor
            .execute(&invocation("sh", &["-c", "exit 7"]))
            .await
            .unwrap();
        assert_eq!(failed.code, Some(7));
    }

    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let temp = TempDir::new().unwrap();
        let executor = ProcessExecutor::new(temp.path());

        executor
            .execute(&invocation("sh", &["-c", "touch marker"]))
            .await
            .unwrap();
        assert!(temp.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let executor = ProcessExecutor::new(temp.path());

        let err = executor
            .execute(&invocation("definitely-not-a-real-program-xyz", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_stage() {
        let temp = TempDir::new().unwrap();
        let executor =
            ProcessExecutor::new(temp.path()).with_timeout(Some(Duration::from_millis(100)));

        let err = executor
            .execute(&invocation("sleep", &["5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_timed_out_stage_does_not_keep_running() {
        let temp = TempDir::new().unwrap();
        let executor =
            ProcessExecutor::new(temp.path()).with_timeout(Some(Duration::from_millis(100)));

        let err = executor
            .execute(&invocation("sh", &["-c", "sleep 1; touch late"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!temp.path().join("late").exists());
    }
}
