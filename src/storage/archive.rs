//! Handle to the shared kifu archive.
//!
//! The archive is the one piece of mutable state shared between stages: the
//! self-play generator appends game records to it and the trainer reads them.
//! The driver never prunes or rotates it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// File extension used by the self-play generator for game records.
pub const KIFU_EXTENSION: &str = "sgf";

/// Explicit handle to the archive directory, passed to every stage that
/// touches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    /// Path exactly as handed to the external programs.
    arg: PathBuf,
    /// Path resolved against the working directory the programs run in.
    location: PathBuf,
}

impl ArchiveHandle {
    /// Creates a handle for `dir`, resolved relative to `work_dir` when not
    /// absolute.
    pub fn new(work_dir: &Path, dir: impl Into<PathBuf>) -> Self {
        let arg = dir.into();
        let location = if arg.is_absolute() {
            arg.clone()
        } else {
            work_dir.join(&arg)
        };
        Self { arg, location }
    }

    /// Returns the path passed on the command line (`--save-dir`, `--kifu-dir`).
    pub fn as_arg(&self) -> &Path {
        &self.arg
    }

    /// Returns the resolved on-disk location.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns true once the archive has been created.
    pub fn exists(&self) -> bool {
        self.location.is_dir()
    }

    /// Walks the archive and counts the files matching `filter`.
    ///
    /// A missing archive yields an empty census rather than an error, since it
    /// is only created by the first self-play run.
    pub fn census(&self, filter: RecordFilter) -> ArchiveCensus {
        let mut census = ArchiveCensus::default();
        if !self.exists() {
            return census;
        }

        for entry in WalkDir::new(&self.location)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if !filter.matches(entry.path()) {
                continue;
            }
            census.files += 1;
            if let Ok(meta) = entry.metadata() {
                census.bytes += meta.len();
            }
        }

        census
    }
}

/// Which archive entries count as records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    /// Only `.sgf` game records.
    #[default]
    Kifu,
    /// Every regular file.
    All,
}

impl RecordFilter {
    fn matches(&self, path: &Path) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::Kifu => path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(KIFU_EXTENSION))
                .unwrap_or(false),
        }
    }
}

/// Summary of the archive contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCensus {
    /// Number of matching files.
    pub files: u64,
    /// Total size of the matching files in bytes.
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_relative_dir_resolves_against_work_dir() {
        let handle = ArchiveHandle::new(Path::new("/srv/go"), "archive");
        assert_eq!(handle.as_arg(), Path::new("archive"));
        assert_eq!(handle.location(), Path::new("/srv/go/archive"));
    }

    #[test]
    fn test_absolute_dir_is_kept() {
        let handle = ArchiveHandle::new(Path::new("/srv/go"), "/data/archive");
        assert_eq!(handle.location(), Path::new("/data/archive"));
    }

    #[test]
    fn test_census_of_missing_archive_is_empty() {
        let temp = TempDir::new().unwrap();
        let handle = ArchiveHandle::new(temp.path(), "archive");
        assert!(!handle.exists());
        assert_eq!(handle.census(RecordFilter::Kifu), ArchiveCensus::default());
    }

    #[test]
    fn test_census_counts_nested_kifu() {
        let temp = TempDir::new().unwrap();
        let handle = ArchiveHandle::new(temp.path(), "archive");
        let nested = handle.location().join("0001");
        fs::create_dir_all(&nested).unwrap();
        fs::write(handle.location().join("1.sgf"), "(;GM[1])").unwrap();
        fs::write(nested.join("2.SGF"), "(;GM[1])").unwrap();
        fs::write(nested.join("notes.txt"), "x").unwrap();

        let kifu = handle.census(RecordFilter::Kifu);
        assert_eq!(kifu.files, 2);
        assert_eq!(kifu.bytes, 16);

        let all = handle.census(RecordFilter::All);
        assert_eq!(all.files, 3);
    }
}
