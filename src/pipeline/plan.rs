//! Invocation schedule.
//!
//! The schedule is fixed before anything runs: a seed phase (self-play from
//! the supervised-learning model, status, train) followed by `iterations`
//! loop phases that self-play from the reinforcement-learning model. Every
//! self-play and training invocation receives the same archive path.

use serde::Serialize;

use crate::storage::{ArchiveHandle, ModelRef};

use super::config::PipelineConfig;
use super::stage::{Invocation, Phase, StageCommand, StageKind};

/// Builds the self-play invocation: `--save-dir <archive> --model <model> --use-gpu <bool>`.
///
/// Paths are converted lossily; [`PipelineConfig::validate`] rejects the
/// ones that are not UTF-8.
pub fn self_play(
    command: &StageCommand,
    phase: Phase,
    archive: &ArchiveHandle,
    model: &ModelRef,
    use_gpu: bool,
) -> Invocation {
    Invocation::from_command(phase, StageKind::SelfPlay, command)
        .flag("save-dir", archive.as_arg().to_string_lossy())
        .flag("model", model.as_arg().to_string_lossy())
        .flag("use-gpu", use_gpu.to_string())
}

/// Builds the status invocation. The extractor takes no flags.
pub fn status(command: &StageCommand, phase: Phase) -> Invocation {
    Invocation::from_command(phase, StageKind::Status, command)
}

/// Builds the training invocation: `--rl true --kifu-dir <archive>`.
pub fn train(command: &StageCommand, phase: Phase, archive: &ArchiveHandle) -> Invocation {
    Invocation::from_command(phase, StageKind::Train, command)
        .flag("rl", "true")
        .flag("kifu-dir", archive.as_arg().to_string_lossy())
}

/// The ordered list of invocations for one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelinePlan {
    invocations: Vec<Invocation>,
}

impl PipelinePlan {
    /// Builds the schedule described by `config`.
    pub fn build(config: &PipelineConfig) -> Self {
        let archive = config.archive();
        let sl_model = config.sl_model_ref();
        let rl_model = config.rl_model_ref();

        let mut phases = Vec::with_capacity(config.iterations as usize + 1);
        if !config.skip_seed {
            phases.push(Phase::Seed);
        }
        phases.extend((1..=config.iterations).map(Phase::Iteration));

        let invocations = phases
            .into_iter()
            .flat_map(|phase| {
                let model = if phase.is_seed() { &sl_model } else { &rl_model };
                [
                    self_play(&config.self_play, phase, &archive, model, config.use_gpu),
                    status(&config.status, phase),
                    train(&config.train, phase, &archive),
                ]
            })
            .collect();

        Self { invocations }
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Number of invocations of `stage`.
    pub fn count(&self, stage: StageKind) -> usize {
        self.invocations.iter().filter(|i| i.stage == stage).count()
    }

    /// Number of distinct phases in the schedule.
    pub fn phase_count(&self) -> usize {
        self.count(StageKind::SelfPlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_shape() {
        let plan = PipelinePlan::build(&PipelineConfig::default());
        assert_eq!(plan.len(), 303);
        for stage in StageKind::ORDER {
            assert_eq!(plan.count(stage), 101);
        }
        assert_eq!(plan.phase_count(), 101);
    }

    #[test]
    fn test_seed_phase_uses_sl_model() {
        let plan = PipelinePlan::build(&PipelineConfig::default());
        let seed: Vec<_> = plan.invocations().iter().take(3).collect();

        assert_eq!(seed[0].phase, Phase::Seed);
        assert_eq!(
            seed[0].command_line(),
            "python3 selfplay_main.py --save-dir archive --model model/sl-model.bin --use-gpu true"
        );
        assert_eq!(seed[1].command_line(), "python3 get_final_status.py");
        assert_eq!(
            seed[2].command_line(),
            "python3 train.py --rl true --kifu-dir archive"
        );
    }

    #[test]
    fn test_loop_phases_use_rl_model() {
        let plan = PipelinePlan::build(&PipelineConfig::default());
        let loop_self_play: Vec<_> = plan
            .invocations()
            .iter()
            .filter(|i| i.stage == StageKind::SelfPlay && !i.phase.is_seed())
            .collect();

        assert_eq!(loop_self_play.len(), 100);
        assert_eq!(loop_self_play[0].phase, Phase::Iteration(1));
        assert_eq!(loop_self_play[99].phase, Phase::Iteration(100));
        assert!(loop_self_play
            .iter()
            .all(|i| i.flag_value("model") == Some("model/rl-model.bin")));
    }

    #[test]
    fn test_skip_seed() {
        let config = PipelineConfig::default().with_iterations(2).with_skip_seed(true);
        let plan = PipelinePlan::build(&config);
        assert_eq!(plan.len(), 6);
        assert_eq!(plan.invocations()[0].phase, Phase::Iteration(1));
    }

    #[test]
    fn test_zero_iterations_is_seed_only() {
        let plan = PipelinePlan::build(&PipelineConfig::default().with_iterations(0));
        assert_eq!(plan.len(), 3);
        assert!(plan.invocations().iter().all(|i| i.phase == Phase::Seed));
    }

    #[test]
    fn test_gpu_flag_follows_config() {
        let plan = PipelinePlan::build(&PipelineConfig::default().with_iterations(0).with_use_gpu(false));
        assert_eq!(plan.invocations()[0].flag_value("use-gpu"), Some("false"));
    }
}
