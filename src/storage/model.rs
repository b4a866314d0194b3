//! Model file references.
//!
//! The driver only passes model paths to the self-play generator; the trainer
//! decides how the reinforcement-learning model is written. These types let
//! the driver observe the file around each training stage without assuming
//! overwrite or versioning semantics.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Path to a model file, as passed to the self-play generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    arg: PathBuf,
    location: PathBuf,
}

impl ModelRef {
    /// Creates a reference to `path`, resolved relative to `work_dir` when not
    /// absolute.
    pub fn new(work_dir: &Path, path: impl Into<PathBuf>) -> Self {
        let arg = path.into();
        let location = if arg.is_absolute() {
            arg.clone()
        } else {
            work_dir.join(&arg)
        };
        Self { arg, location }
    }

    /// Returns the path passed on the command line (`--model`).
    pub fn as_arg(&self) -> &Path {
        &self.arg
    }

    /// Returns the resolved on-disk location.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Takes a snapshot of the file's current state.
    pub fn observe(&self) -> ModelSnapshot {
        match fs::metadata(&self.location) {
            Ok(meta) if meta.is_file() => ModelSnapshot {
                exists: true,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            },
            _ => ModelSnapshot::missing(),
        }
    }
}

/// Point-in-time view of a model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub exists: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl ModelSnapshot {
    /// Snapshot of a file that does not exist.
    pub fn missing() -> Self {
        Self {
            exists: false,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if `after` looks like a different file than `self`.
    pub fn changed_to(&self, after: &ModelSnapshot) -> bool {
        self != after
    }
}
