//! End-to-end runs against small shell-script stand-ins for the external
//! self-play, status and training programs.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use selfplay_pipeline::pipeline::{
    FailurePolicy, Phase, PipelineConfig, PipelineDriver, StageCommand, StageKind,
};
use selfplay_pipeline::runner::StageStatus;
use selfplay_pipeline::storage::RecordFilter;
use selfplay_pipeline::PipelineError;
use tempfile::TempDir;

// $1=--save-dir $2=<dir> $3=--model $4=<path> $5=--use-gpu $6=<bool>
const SELF_PLAY: &str = r#"
mkdir -p "$2"
n=$(ls "$2" | wc -l | tr -d ' ')
echo "(;GM[1]SZ[9])" > "$2/game-$n.sgf"
echo "$4" >> models-used.txt
"#;

// $1=--rl $2=<bool> $3=--kifu-dir $4=<dir>
const TRAIN: &str = r#"
test -d "$4" || exit 3
mkdir -p model
echo "weights" >> model/rl-model.bin
"#;

const STATUS: &str = r#"
echo "games: $(ls archive | wc -l)"
"#;

fn write_stub(dir: &Path, name: &str, body: &str) -> StageCommand {
    fs::write(dir.join(name), body).unwrap();
    StageCommand::new("sh").with_arg(name)
}

fn stub_config(dir: &Path, iterations: u32) -> PipelineConfig {
    PipelineConfig::default()
        .with_work_dir(dir)
        .with_iterations(iterations)
        .with_command(StageKind::SelfPlay, write_stub(dir, "selfplay.sh", SELF_PLAY))
        .with_command(StageKind::Status, write_stub(dir, "status.sh", STATUS))
        .with_command(StageKind::Train, write_stub(dir, "train.sh", TRAIN))
}

#[tokio::test]
async fn test_stub_pipeline_accumulates_archive() {
    let temp = TempDir::new().unwrap();
    let config = stub_config(temp.path(), 3);
    let archive = config.archive();

    let report = PipelineDriver::new(config).unwrap().run().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.stats.invocations, 12);
    assert_eq!(archive.census(RecordFilter::Kifu).files, 4);

    let models = fs::read_to_string(temp.path().join("models-used.txt")).unwrap();
    let models: Vec<_> = models.lines().collect();
    assert_eq!(
        models,
        vec![
            "model/sl-model.bin",
            "model/rl-model.bin",
            "model/rl-model.bin",
            "model/rl-model.bin"
        ]
    );

    let weights = fs::read_to_string(temp.path().join("model/rl-model.bin")).unwrap();
    assert_eq!(weights.lines().count(), 4);
}

#[tokio::test]
async fn test_failing_status_is_ignored_under_continue() {
    let temp = TempDir::new().unwrap();
    let config = stub_config(temp.path(), 2)
        .with_command(StageKind::Status, StageCommand::new("false"))
        .with_failure_policy(FailurePolicy::Continue);

    let report = PipelineDriver::new(config).unwrap().run().await.unwrap();

    assert_eq!(report.stats.invocations, 9);
    assert_eq!(report.stats.failed, 3);
    assert!(report.failures().all(|o| o.stage == StageKind::Status));
    // training still ran after every failed status
    assert_eq!(
        fs::read_to_string(temp.path().join("model/rl-model.bin"))
            .unwrap()
            .lines()
            .count(),
        3
    );
}

#[tokio::test]
async fn test_failing_status_halts_under_fail_fast() {
    let temp = TempDir::new().unwrap();
    let config = stub_config(temp.path(), 2)
        .with_command(StageKind::Status, StageCommand::new("false"));

    let err = PipelineDriver::new(config).unwrap().run().await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StageFailed {
            phase: Phase::Seed,
            stage: StageKind::Status,
            ..
        }
    ));
    assert!(!temp.path().join("model/rl-model.bin").exists());
}

#[tokio::test]
async fn test_missing_program_is_a_failed_stage() {
    let temp = TempDir::new().unwrap();
    let config = stub_config(temp.path(), 1)
        .with_command(StageKind::Train, StageCommand::new("no-such-trainer-binary"))
        .with_failure_policy(FailurePolicy::Continue);

    let report = PipelineDriver::new(config).unwrap().run().await.unwrap();

    assert_eq!(report.stats.failed, 2);
    assert!(report
        .failures()
        .all(|o| o.error.as_deref().unwrap_or("").contains("no-such-trainer-binary")));
}

fn hanging_status() -> StageCommand {
    StageCommand::new("sleep").with_arg("5")
}

#[tokio::test]
async fn test_timed_out_stage_counts_as_failed_under_continue() {
    let temp = TempDir::new().unwrap();
    let config = stub_config(temp.path(), 0)
        .with_command(StageKind::Status, hanging_status())
        .with_stage_timeout_secs(1)
        .with_failure_policy(FailurePolicy::Continue);

    let report = PipelineDriver::new(config).unwrap().run().await.unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            StageStatus::Succeeded,
            StageStatus::TimedOut,
            StageStatus::Succeeded
        ]
    );
    assert_eq!(report.stats.failed, 1);
    assert!(temp.path().join("model/rl-model.bin").exists());
}

#[tokio::test]
async fn test_timed_out_stage_halts_under_fail_fast() {
    let temp = TempDir::new().unwrap();
    let config = stub_config(temp.path(), 1)
        .with_command(StageKind::Status, hanging_status())
        .with_stage_timeout_secs(1);

    let err = PipelineDriver::new(config).unwrap().run().await.unwrap_err();

    match err {
        PipelineError::StageFailed {
            phase,
            stage,
            reason,
        } => {
            assert_eq!(phase, Phase::Seed);
            assert_eq!(stage, StageKind::Status);
            assert!(reason.contains("timed out"), "reason: {}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!temp.path().join("model/rl-model.bin").exists());
}
