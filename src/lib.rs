//! Pull a git repository, but only if it hasn't been updated recently.
//!
//! ## How it works
//!
//! `ensure-update` is meant to be called often (from shell aliases, prompts or scripts)
//! in front of a slow or rate-limited `git pull`. Every run **loads** the time
//! of the last successful update, **decides** whether the interval has passed,
//! **updates** the working copy if it has, and **records** the new time if the
//! update succeeded.
//!
//! ```ignore
//! +------+       +--------+       +---------+       +--------+
//! | load | ----> | decide | ----> | updater | ----> | record |
//! +------+       +--------+       +---------+       +--------+
//! ```
//!
//! A failed update is never recorded, so the next run tries again.
//!

/// The source of the current time.
pub mod clock;
/// Durations on the command line and for humans.
pub mod interval;
/// The decision whether an update is due.
pub mod policy;
/// The persisted time of the last update of each working copy
/// (e.g. [in record files](store::file::FileStore)).
pub mod store;
/// An updater refreshes a working copy (e.g. [with git](updater::git::GitUpdater)).
pub mod updater;

/// A single run, tying the store, the decision and the updater together.
pub mod start;
