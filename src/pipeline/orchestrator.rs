//! Pipeline driver.
//!
//! Runs the schedule built by [`PipelinePlan`] one invocation at a time:
//! - each stage is awaited before the next is spawned
//! - every invocation yields a [`StageOutcome`]
//! - failures are handled by the configured [`FailurePolicy`]
//! - the run can be interrupted between or during stages

use std::future::Future;
use std::time::Instant;

use tracing::{debug, error, info, warn, Level};

use crate::error::{PipelineError, StageError};
use crate::runner::{ProcessExecutor, StageExecutor, StageOutcome};
use crate::storage::{ArchiveCensus, ModelRef, ModelSnapshot, RecordFilter};

use super::config::{FailurePolicy, PipelineConfig};
use super::plan::PipelinePlan;
use super::report::RunReport;
use super::stage::{Invocation, Phase, StageKind};

/// Drives the self-play, status and training stages through every phase.
pub struct PipelineDriver {
    config: PipelineConfig,
    executor: Box<dyn StageExecutor>,
}

impl PipelineDriver {
    /// Creates a driver that spawns the configured external programs.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let executor =
            ProcessExecutor::new(&config.work_dir).with_timeout(config.stage_timeout());
        Self::with_executor(config, Box::new(executor))
    }

    /// Creates a driver with a custom stage executor.
    pub fn with_executor(
        config: PipelineConfig,
        executor: Box<dyn StageExecutor>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, executor })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds the invocation schedule without running anything.
    pub fn plan(&self) -> PipelinePlan {
        PipelinePlan::build(&self.config)
    }

    /// Runs the full schedule.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the full schedule, stopping early when `shutdown` resolves.
    ///
    /// An in-flight stage is killed on shutdown. The run report, when
    /// configured, is written for completed, halted and interrupted runs.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let plan = self.plan();
        let rl_model = self.config.rl_model_ref();
        let mut report = RunReport::start(&self.config, plan.len());

        info!(
            "Starting pipeline run {}: {} phases, {} invocations, on failure: {}",
            report.run_id,
            plan.phase_count(),
            plan.len(),
            self.config.on_failure
        );

        let mut current_phase: Option<Phase> = None;

        for invocation in plan.invocations() {
            if current_phase != Some(invocation.phase) {
                current_phase = Some(invocation.phase);
                self.enter_phase(invocation.phase, &rl_model);
            }

            let model_before = (invocation.stage == StageKind::Train).then(|| rl_model.observe());

            let outcome = tokio::select! {
                outcome = self.execute(invocation) => outcome,
                _ = &mut shutdown => {
                    warn!(
                        "Interrupted during {} while running {}",
                        invocation.phase, invocation.stage
                    );
                    report.halt(format!(
                        "interrupted during {} while running {}",
                        invocation.phase, invocation.stage
                    ));
                    self.finish_halted(&mut report);
                    return Err(PipelineError::Interrupted {
                        phase: invocation.phase,
                        stage: invocation.stage,
                    });
                }
            };

            self.log_outcome(&outcome);
            report.record(outcome.clone());

            if outcome.is_success() {
                self.after_stage(invocation, model_before.as_ref(), &rl_model);
                continue;
            }

            match self.config.on_failure {
                FailurePolicy::FailFast => {
                    error!(
                        "{} failed during {}: {}; stopping",
                        invocation.stage,
                        invocation.phase,
                        outcome.reason()
                    );
                    report.halt(format!(
                        "{} failed during {}: {}",
                        invocation.stage,
                        invocation.phase,
                        outcome.reason()
                    ));
                    self.finish_halted(&mut report);
                    return Err(PipelineError::StageFailed {
                        phase: invocation.phase,
                        stage: invocation.stage,
                        reason: outcome.reason(),
                    });
                }
                FailurePolicy::Continue => {
                    warn!(
                        "{} failed during {}: {}; continuing",
                        invocation.stage,
                        invocation.phase,
                        outcome.reason()
                    );
                }
            }
        }

        if report.stats.failed > 0 {
            warn!(
                "Pipeline run {} finished with {} of {} invocations failed",
                report.run_id, report.stats.failed, report.stats.invocations
            );
        } else {
            info!(
                "Pipeline run {} finished: {} invocations in {:?}",
                report.run_id, report.stats.invocations, report.stats.stage_time
            );
        }

        self.finish(&mut report)?;
        Ok(report)
    }

    /// Runs one invocation and converts whatever happened into an outcome.
    async fn execute(&self, invocation: &Invocation) -> StageOutcome {
        debug!("Running {}", invocation.command_line());
        let start = Instant::now();

        match self.executor.execute(invocation).await {
            Ok(exit) => StageOutcome::exited(invocation, exit, start.elapsed()),
            Err(StageError::Timeout(_)) => StageOutcome::timed_out(invocation, start.elapsed()),
            Err(e @ StageError::Spawn { .. }) => StageOutcome::spawn_failed(invocation, e.to_string()),
            Err(e) => StageOutcome::failed(invocation, e.to_string(), start.elapsed()),
        }
    }

    fn enter_phase(&self, phase: Phase, rl_model: &ModelRef) {
        info!("Entering {}", phase);

        if let Phase::Iteration(_) = phase {
            if !rl_model.observe().exists {
                warn!(
                    "{} does not exist at the start of {}; self-play will be given a missing model",
                    rl_model.location().display(),
                    phase
                );
            }
        }
    }

    fn after_stage(
        &self,
        invocation: &Invocation,
        model_before: Option<&ModelSnapshot>,
        rl_model: &ModelRef,
    ) {
        match invocation.stage {
            StageKind::SelfPlay => {
                if let Some(census) = self.archive_census() {
                    debug!(
                        "Archive holds {} kifu ({} bytes) after {}",
                        census.files, census.bytes, invocation.phase
                    );
                }
            }
            StageKind::Train => {
                let after = rl_model.observe();
                match model_before {
                    Some(before) if before.changed_to(&after) => info!(
                        "Trainer updated {} ({} bytes)",
                        rl_model.location().display(),
                        after.size
                    ),
                    _ => warn!(
                        "{} unchanged after training in {}",
                        rl_model.location().display(),
                        invocation.phase
                    ),
                }
            }
            StageKind::Status => {}
        }
    }

    /// Walks the archive only when debug output is enabled.
    fn archive_census(&self) -> Option<ArchiveCensus> {
        tracing::enabled!(Level::DEBUG).then(|| self.config.archive().census(RecordFilter::Kifu))
    }

    fn log_outcome(&self, outcome: &StageOutcome) {
        if outcome.is_success() {
            info!(
                "{} {} completed in {:.1}s",
                outcome.phase,
                outcome.stage,
                outcome.duration.as_secs_f64()
            );
        } else {
            debug!(
                "{} {} ended with status {} after {:.1}s",
                outcome.phase,
                outcome.stage,
                outcome.status,
                outcome.duration.as_secs_f64()
            );
        }
    }

    /// Stamps the report and writes it if a report path is configured.
    fn finish(&self, report: &mut RunReport) -> Result<(), PipelineError> {
        report.finish();
        if let Some(path) = &self.config.report_path {
            report.write_json(path)?;
            debug!("Wrote run report to {}", path.display());
        }
        Ok(())
    }

    /// Like [`Self::finish`] for a run that is already stopping with an
    /// error; a report write failure is logged instead of replacing it.
    fn finish_halted(&self, report: &mut RunReport) {
        if let Err(e) = self.finish(report) {
            error!("{}", e);
        }
    }
}
