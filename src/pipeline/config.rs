//! Pipeline configuration.
//!
//! The defaults reproduce the fixed contract of the driver: 100 iterations,
//! `archive` as the kifu directory, `model/sl-model.bin` seeding the loop and
//! `model/rl-model.bin` driving it, GPU self-play. A YAML file, environment
//! variables and CLI flags can each override them, in that order.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::{ArchiveHandle, ModelRef};

use super::stage::{StageCommand, StageKind};

/// Number of reinforcement-learning iterations after the seed phase.
pub const DEFAULT_ITERATIONS: u32 = 100;
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";
pub const DEFAULT_SL_MODEL: &str = "model/sl-model.bin";
pub const DEFAULT_RL_MODEL: &str = "model/rl-model.bin";

/// What the driver does when a stage does not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the run and report the phase and stage that failed.
    #[default]
    FailFast,
    /// Log the failure and proceed to the next scheduled command.
    Continue,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail-fast" | "failfast" | "halt" | "stop" => Ok(FailurePolicy::FailFast),
            "continue" | "ignore" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "Unknown failure policy: {} (expected 'fail-fast' or 'continue')",
                other
            )),
        }
    }
}

/// Configuration for the pipeline driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reinforcement-learning iterations after the seed phase.
    pub iterations: u32,
    /// Directory the external programs run in; relative paths resolve here.
    pub work_dir: PathBuf,
    /// Kifu archive shared by self-play and training.
    pub archive_dir: PathBuf,
    /// Supervised-learning model used for the seed self-play.
    pub sl_model: PathBuf,
    /// Reinforcement-learning model used by every loop self-play.
    pub rl_model: PathBuf,
    /// Value of `--use-gpu` passed to self-play.
    pub use_gpu: bool,

    pub self_play: StageCommand,
    pub status: StageCommand,
    pub train: StageCommand,

    /// Per-stage timeout in seconds; none by default.
    pub stage_timeout_secs: Option<u64>,
    pub on_failure: FailurePolicy,
    /// Start at loop iteration 1 without running the seed phase.
    pub skip_seed: bool,
    /// Where to write the JSON run report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            work_dir: PathBuf::from("."),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            sl_model: PathBuf::from(DEFAULT_SL_MODEL),
            rl_model: PathBuf::from(DEFAULT_RL_MODEL),
            use_gpu: true,

            self_play: StageCommand::default_self_play(),
            status: StageCommand::default_status(),
            train: StageCommand::default_train(),

            stage_timeout_secs: None,
            on_failure: FailurePolicy::default(),
            skip_seed: false,
            report_path: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the layered configuration: defaults, then the optional YAML
    /// file, then the process environment. CLI overrides are applied by the
    /// caller, which then calls [`PipelineConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Creates configuration from environment variables over the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_ITERATIONS`: loop iterations (default: 100)
    /// - `PIPELINE_WORK_DIR`: working directory for the stages (default: .)
    /// - `PIPELINE_ARCHIVE_DIR`: kifu archive (default: archive)
    /// - `PIPELINE_SL_MODEL`: supervised-learning model (default: model/sl-model.bin)
    /// - `PIPELINE_RL_MODEL`: reinforcement-learning model (default: model/rl-model.bin)
    /// - `PIPELINE_USE_GPU`: GPU self-play (default: true)
    /// - `PIPELINE_ON_FAILURE`: `fail-fast` or `continue` (default: fail-fast)
    /// - `PIPELINE_STAGE_TIMEOUT_SECS`: per-stage timeout (default: none)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("PIPELINE_ITERATIONS") {
            self.iterations = parse_env_value(&val, "PIPELINE_ITERATIONS")?;
        }

        if let Some(val) = lookup("PIPELINE_WORK_DIR") {
            self.work_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("PIPELINE_ARCHIVE_DIR") {
            self.archive_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("PIPELINE_SL_MODEL") {
            self.sl_model = PathBuf::from(val);
        }

        if let Some(val) = lookup("PIPELINE_RL_MODEL") {
            self.rl_model = PathBuf::from(val);
        }

        if let Some(val) = lookup("PIPELINE_USE_GPU") {
            self.use_gpu = parse_env_bool(&val, "PIPELINE_USE_GPU")?;
        }

        if let Some(val) = lookup("PIPELINE_ON_FAILURE") {
            self.on_failure = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "PIPELINE_ON_FAILURE".to_string(),
                message,
            })?;
        }

        if let Some(val) = lookup("PIPELINE_STAGE_TIMEOUT_SECS") {
            self.stage_timeout_secs = Some(parse_env_value(&val, "PIPELINE_STAGE_TIMEOUT_SECS")?);
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stage in StageKind::ORDER {
            if self.command(stage).program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} program cannot be empty",
                    stage
                )));
            }
        }

        if self.archive_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "archive_dir cannot be empty".to_string(),
            ));
        }

        if self.sl_model.as_os_str().is_empty() || self.rl_model.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model paths cannot be empty".to_string(),
            ));
        }

        for (key, path) in [
            ("archive_dir", &self.archive_dir),
            ("sl_model", &self.sl_model),
            ("rl_model", &self.rl_model),
        ] {
            if path.to_str().is_none() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be valid UTF-8: {}",
                    key,
                    path.display()
                )));
            }
        }

        if self.stage_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "stage_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.skip_seed && self.iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "skip_seed with zero iterations schedules nothing".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the command configured for `stage`.
    pub fn command(&self, stage: StageKind) -> &StageCommand {
        match stage {
            StageKind::SelfPlay => &self.self_play,
            StageKind::Status => &self.status,
            StageKind::Train => &self.train,
        }
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    pub fn archive(&self) -> ArchiveHandle {
        ArchiveHandle::new(&self.work_dir, &self.archive_dir)
    }

    pub fn sl_model_ref(&self) -> ModelRef {
        ModelRef::new(&self.work_dir, &self.sl_model)
    }

    pub fn rl_model_ref(&self) -> ModelRef {
        ModelRef::new(&self.work_dir, &self.rl_model)
    }

    /// Builder method to set the loop iteration count.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Builder method to set the working directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Builder method to set the archive directory.
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    /// Builder method to set the supervised-learning model path.
    pub fn with_sl_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.sl_model = path.into();
        self
    }

    /// Builder method to set the reinforcement-learning model path.
    pub fn with_rl_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.rl_model = path.into();
        self
    }

    /// Builder method to enable or disable GPU self-play.
    pub fn with_use_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    /// Builder method to replace the command for one stage.
    pub fn with_command(mut self, stage: StageKind, command: StageCommand) -> Self {
        match stage {
            StageKind::SelfPlay => self.self_play = command,
            StageKind::Status => self.status = command,
            StageKind::Train => self.train = command,
        }
        self
    }

    /// Builder method to set the per-stage timeout in whole seconds.
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = Some(secs);
        self
    }

    /// Builder method to set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Builder method to skip the seed phase.
    pub fn with_skip_seed(mut self, skip: bool) -> Self {
        self.skip_seed = skip;
        self
    }

    /// Builder method to set the run report path.
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
