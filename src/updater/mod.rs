use crate::interval::Interval;
use mockall::automock;
use std::{fmt, path::Path};
use thiserror::Error;

/// Split the update command into a runnable expression.
pub mod command;
/// An updater running `git pull` (or a custom command) on a git working copy.
pub mod git;

/// A custom error for describing the error cases of updates.
///
/// None of these are recorded as a successful update.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The path doesn't exist or is not a git working copy.
    #[error("{0} is not a valid working copy ({1})")]
    InvalidTarget(String, String),
    /// The update command cannot be split into a program and its arguments.
    #[error("cannot parse the update command {0:?}")]
    InvalidCommand(String),
    /// The update command cannot be started, e.g. git is not installed.
    #[error("the update command cannot run: {0}")]
    ClientFailure(#[from] std::io::Error),
    /// The update command returned a non-zero exit code (network failure, conflict,
    /// authentication failure). The parameters are the exit code and the output.
    #[error("the update command returned non-zero exit code {0} with message: {1}")]
    ClientError(i32, String),
    /// The update command didn't finish in time and was killed.
    #[error("the update command didn't finish in {0}")]
    Timeout(Interval),
}

/// What a successful update did to the working copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateReport {
    /// The pull didn't bring any changes.
    AlreadyUpToDate,
    /// The pull moved HEAD. `from` is empty if the branch had no commits before.
    Changed { from: Option<String>, to: String },
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReport::AlreadyUpToDate => write!(f, "No new changes"),
            UpdateReport::Changed {
                from: Some(from),
                to,
            } => write!(f, "Pulled {}..{}", shorthash(from), shorthash(to)),
            UpdateReport::Changed { from: None, to } => write!(f, "Pulled {}", shorthash(to)),
        }
    }
}

/// Shorten a commit hash like git does.
pub fn shorthash(sha: &str) -> &str {
    sha.get(0..7).unwrap_or(sha)
}

/// An updater refreshes a working copy from its remote.
///
/// It runs the external update exactly once per call and never retries.
#[automock]
pub trait Updater {
    /// Update the working copy at the path.
    fn run(&self, path: &Path) -> Result<UpdateReport, UpdateError>;
}
