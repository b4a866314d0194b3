//! Run statistics and the JSON run report.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::runner::StageOutcome;

use super::config::{FailurePolicy, PipelineConfig};
use super::stage::StageKind;

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Total number of invocations that ran.
    pub invocations: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub self_play: u64,
    pub status: u64,
    pub train: u64,
    /// Wall time spent inside stages.
    pub stage_time: Duration,
}

impl PipelineStats {
    /// Creates new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished invocation.
    pub fn record(&mut self, outcome: &StageOutcome) {
        self.invocations += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        match outcome.stage {
            StageKind::SelfPlay => self.self_play += 1,
            StageKind::Status => self.status += 1,
            StageKind::Train => self.train += 1,
        }
        self.stage_time += outcome.duration;
    }

    /// Number of invocations of `stage`.
    pub fn count(&self, stage: StageKind) -> u64 {
        match stage {
            StageKind::SelfPlay => self.self_play,
            StageKind::Status => self.status,
            StageKind::Train => self.train,
        }
    }
}

/// Everything the driver knows about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub iterations: u32,
    pub on_failure: FailurePolicy,
    /// Number of invocations in the schedule.
    pub scheduled: usize,
    pub stats: PipelineStats,
    /// Why the run stopped early, if it did.
    pub halted: Option<String>,
    pub outcomes: Vec<StageOutcome>,
}

impl RunReport {
    /// Starts a report for a run of `config` with `scheduled` invocations.
    pub fn start(config: &PipelineConfig, scheduled: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            iterations: config.iterations,
            on_failure: config.on_failure,
            scheduled,
            stats: PipelineStats::new(),
            halted: None,
            outcomes: Vec::with_capacity(scheduled),
        }
    }

    pub fn record(&mut self, outcome: StageOutcome) {
        self.stats.record(&outcome);
        self.outcomes.push(outcome);
    }

    /// Marks the run as stopped before the schedule completed.
    pub fn halt(&mut self, reason: impl Into<String>) {
        self.halted = Some(reason.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when every scheduled invocation ran and succeeded.
    pub fn is_clean(&self) -> bool {
        self.halted.is_none()
            && self.stats.failed == 0
            && self.stats.invocations as usize == self.scheduled
    }

    /// Outcomes that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Writes the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let report_err = |message: String| PipelineError::Report {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| report_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| report_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| report_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::{Invocation, Phase, StageCommand};
    use crate::runner::StageExit;
    use tempfile::TempDir;

    fn outcome(stage: StageKind, code: i32) -> StageOutcome {
        let invocation =
            Invocation::from_command(Phase::Seed, stage, &StageCommand::default_for(stage));
        StageOutcome::exited(&invocation, StageExit::with_code(code), Duration::from_millis(10))
    }

    #[test]
    fn test_stats_record() {
        let mut stats = PipelineStats::new();
        stats.record(&outcome(StageKind::SelfPlay, 0));
        stats.record(&outcome(StageKind::Status, 1));
        stats.record(&outcome(StageKind::Train, 0));

        assert_eq!(stats.invocations, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.count(StageKind::Status), 1);
        assert_eq!(stats.stage_time, Duration::from_millis(30));
    }

    #[test]
    fn test_clean_report() {
        let config = PipelineConfig::default().with_iterations(0);
        let mut report = RunReport::start(&config, 3);
        for stage in StageKind::ORDER {
            report.record(outcome(stage, 0));
        }
        report.finish();
        assert!(report.is_clean());
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn test_halted_report_is_not_clean() {
        let config = PipelineConfig::default().with_iterations(0);
        let mut report = RunReport::start(&config, 3);
        report.record(outcome(StageKind::SelfPlay, 2));
        report.halt("self-play failed during seed");
        assert!(!report.is_clean());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_write_json_creates_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reports").join("run.json");
        let config = PipelineConfig::default();
        let mut report = RunReport::start(&config, 303);
        report.record(outcome(StageKind::SelfPlay, 0));
        report.finish();
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["iterations"], 100);
        assert_eq!(value["on_failure"], "fail-fast");
        assert_eq!(value["stats"]["self_play"], 1);
        assert_eq!(value["outcomes"][0]["phase"], "seed");
    }
}
