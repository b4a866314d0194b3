//! Stage identities and external command descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three external programs the driver sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Self-play data generator; appends kifu to the archive.
    SelfPlay,
    /// Status extractor; reports on the most recent self-play results.
    Status,
    /// Trainer; consumes the archive and writes the reinforcement-learning model.
    Train,
}

impl StageKind {
    /// All stages in the order they run within one phase.
    pub const ORDER: [StageKind; 3] = [StageKind::SelfPlay, StageKind::Status, StageKind::Train];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::SelfPlay => "self-play",
            StageKind::Status => "status",
            StageKind::Train => "train",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the schedule an invocation sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "iteration")]
pub enum Phase {
    /// The single pass seeded from the supervised-learning model.
    Seed,
    /// Reinforcement-learning loop iteration, 1-based.
    Iteration(u32),
}

impl Phase {
    pub fn is_seed(&self) -> bool {
        matches!(self, Phase::Seed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Seed => write!(f, "seed"),
            Phase::Iteration(n) => write!(f, "iteration {}", n),
        }
    }
}

/// Program and leading arguments for a stage, before the driver appends
/// its own flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds a leading argument (typically the script path).
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Default self-play generator: `python3 selfplay_main.py`.
    pub fn default_self_play() -> Self {
        Self::new("python3").with_arg("selfplay_main.py")
    }

    /// Default status extractor: `python3 get_final_status.py`.
    pub fn default_status() -> Self {
        Self::new("python3").with_arg("get_final_status.py")
    }

    /// Default trainer: `python3 train.py`.
    pub fn default_train() -> Self {
        Self::new("python3").with_arg("train.py")
    }

    /// Default command for the given stage.
    pub fn default_for(stage: StageKind) -> Self {
        match stage {
            StageKind::SelfPlay => Self::default_self_play(),
            StageKind::Status => Self::default_status(),
            StageKind::Train => Self::default_train(),
        }
    }
}

/// A fully resolved external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub phase: Phase,
    pub stage: StageKind,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Starts an invocation from a stage command; flags are appended with
    /// [`Invocation::flag`].
    pub fn from_command(phase: Phase, stage: StageKind, command: &StageCommand) -> Self {
        Self {
            phase,
            stage,
            program: command.program.clone(),
            args: command.args.clone(),
        }
    }

    /// Appends `--name value`.
    pub fn flag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.args.push(format!("--{}", name));
        self.args.push(value.into());
        self
    }

    /// Returns the value following `--name`, if present.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let key = format!("--{}", name);
        self.args
            .windows(2)
            .find(|pair| pair[0] == key)
            .map(|pair| pair[1].as_str())
    }

    /// Space-joined command line, for logs and plans.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Seed.to_string(), "seed");
        assert_eq!(Phase::Iteration(7).to_string(), "iteration 7");
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::Iteration(3)).unwrap();
        assert_eq!(json, r#"{"phase":"iteration","iteration":3}"#);
        let json = serde_json::to_string(&Phase::Seed).unwrap();
        assert_eq!(json, r#"{"phase":"seed"}"#);
    }

    #[test]
    fn test_invocation_flags() {
        let inv = Invocation::from_command(
            Phase::Seed,
            StageKind::Train,
            &StageCommand::default_train(),
        )
        .flag("rl", "true")
        .flag("kifu-dir", "archive");

        assert_eq!(inv.command_line(), "python3 train.py --rl true --kifu-dir archive");
        assert_eq!(inv.flag_value("rl"), Some("true"));
        assert_eq!(inv.flag_value("kifu-dir"), Some("archive"));
        assert_eq!(inv.flag_value("model"), None);
    }

    #[test]
    fn test_stage_command_yaml_defaults_args() {
        let cmd: StageCommand = serde_yaml::from_str("program: ./status.sh").unwrap();
        assert_eq!(cmd.program, "./status.sh");
        assert!(cmd.args.is_empty());
    }
}
