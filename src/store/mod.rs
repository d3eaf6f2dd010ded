use mockall::automock;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

/// A store keeping one record file per working copy.
pub mod file;
/// An advisory lock, so only one process updates a working copy at a time.
pub mod lock;

/// A custom error for describing the error cases of the timestamp store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record cannot be written, e.g. the disk is full or read-only.
    #[error("cannot write record {0}: {1}")]
    Write(PathBuf, std::io::Error),
    /// The record exists, but cannot be read.
    #[error("cannot read record {0}: {1}")]
    Read(PathBuf, std::io::Error),
    /// The record was read, but its contents are invalid.
    #[error("record {0} is corrupt: {1}")]
    Corrupt(PathBuf, String),
}

/// The persisted state for one working copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRecord {
    /// The normalized path of the working copy.
    pub path: PathBuf,
    /// The time the last successful update finished.
    pub last_update: OffsetDateTime,
}

/// A durable mapping from working copies to the time of their last successful update.
#[automock]
pub trait TimestampStore {
    /// Load the time of the last successful update.
    ///
    /// Returns `None` if it was never recorded. Unreadable or corrupt records
    /// are also `None`, so a broken store leads to an update instead of an error.
    fn load(&self, path: &Path) -> Option<OffsetDateTime>;

    /// Record the time of a successful update. Readers never see a partial write.
    fn save(&self, path: &Path, timestamp: OffsetDateTime) -> Result<(), StoreError>;
}
