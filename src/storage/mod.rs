//! On-disk state shared between pipeline stages.
//!
//! - [`ArchiveHandle`]: the append-only kifu archive
//! - [`ModelRef`]: the supervised and reinforcement-learning model files

pub mod archive;
pub mod model;

pub use archive::{ArchiveCensus, ArchiveHandle, RecordFilter, KIFU_EXTENSION};
pub use model::{ModelRef, ModelSnapshot};
