use super::{command::create_command, UpdateError, UpdateReport, Updater};
use crate::interval::Interval;
use duct::Handle;
use git2::{ErrorCode, Repository};
use log::{debug, info, trace};
#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::{
    path::Path,
    process::Output,
    thread::sleep,
    time::{Duration, Instant},
};

const FIRST_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_millis(250);

/// An updater pulling a git working copy.
///
/// The working copy is validated and its HEAD is read with libgit2, but the pull
/// itself runs the external command (`git pull` by default) in the directory,
/// so it uses the same credentials, hooks and configuration as the user's git.
/// The output is captured and logged on info level.
pub struct GitUpdater {
    command: String,
    timeout: Option<Duration>,
}

impl GitUpdater {
    /// Creates an updater with the command and an optional time limit for it.
    pub fn new(command: String, timeout: Option<Duration>) -> Self {
        GitUpdater { command, timeout }
    }

    fn open(path: &Path) -> Result<Repository, UpdateError> {
        let directory = path.to_string_lossy().to_string();
        if !path.is_dir() {
            return Err(UpdateError::InvalidTarget(
                directory,
                String::from("the directory doesn't exist"),
            ));
        }

        let repo = Repository::open(path)
            .map_err(|err| UpdateError::InvalidTarget(directory.clone(), err.message().to_string()))?;
        if repo.is_bare() {
            return Err(UpdateError::InvalidTarget(
                directory,
                String::from("the repository is bare, there is nothing to pull into"),
            ));
        }

        Ok(repo)
    }

    fn head_commit(path: &Path) -> Result<Option<String>, UpdateError> {
        let repo = GitUpdater::open(path)?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(None);
            }
            Err(err) => {
                return Err(UpdateError::InvalidTarget(
                    path.to_string_lossy().to_string(),
                    err.message().to_string(),
                ))
            }
        };

        Ok(head.target().map(|oid| oid.to_string()))
    }

    fn wait<'a>(&self, handle: &'a Handle) -> Result<&'a Output, UpdateError> {
        let Some(timeout) = self.timeout else {
            return Ok(handle.wait()?);
        };

        let deadline = Instant::now() + timeout;
        let mut poll = FIRST_POLL;
        loop {
            if let Some(output) = handle.try_wait()? {
                return Ok(output);
            }

            let now = Instant::now();
            if now >= deadline {
                GitUpdater::kill(handle)?;
                return Err(UpdateError::Timeout(Interval::new(timeout)));
            }

            sleep(poll.min(deadline - now));
            poll = (poll * 2).min(MAX_POLL);
        }
    }

    /// Kill the command with everything it started, like `ssh` or the hooks.
    /// On unix the command leads its own process group, so the whole group is killed.
    fn kill(handle: &Handle) -> Result<(), UpdateError> {
        #[cfg(unix)]
        for pid in handle.pids() {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => return Err(UpdateError::ClientFailure(err.into())),
            }
        }
        handle.kill()?;

        Ok(())
    }

    fn run_command(&self, path: &Path) -> Result<String, UpdateError> {
        let (program, expression) = create_command(&self.command)
            .ok_or_else(|| UpdateError::InvalidCommand(self.command.clone()))?;

        debug!(
            "Running {program}: {} in directory {}.",
            self.command,
            path.to_string_lossy()
        );

        // Never wait for a password prompt or an editor, nobody is there to answer.
        let expression = expression
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_MERGE_AUTOEDIT", "no")
            .stderr_to_stdout()
            .stdout_capture()
            .dir(path)
            .unchecked();
        #[cfg(unix)]
        let expression = expression.before_spawn(|command| {
            command.process_group(0);
            Ok(())
        });
        let handle = expression.start()?;
        let output = self.wait(&handle)?;

        let output_str = String::from_utf8_lossy(&output.stdout)
            .trim_end()
            .to_string();
        output_str.lines().for_each(|line| {
            info!("{line}");
        });

        if output.status.success() {
            Ok(output_str)
        } else {
            Err(UpdateError::ClientError(
                output.status.code().unwrap_or(-1),
                output_str,
            ))
        }
    }
}

impl Updater for GitUpdater {
    /// Pull the working copy once, and compare HEAD before and after to tell
    /// if anything changed.
    fn run(&self, path: &Path) -> Result<UpdateReport, UpdateError> {
        let before = GitUpdater::head_commit(path)?;
        self.run_command(path)?;
        let after = GitUpdater::head_commit(path)?;

        trace!("HEAD was {before:?} before the update and {after:?} after.");

        match (before, after) {
            (from, Some(to)) if from.as_deref() != Some(to.as_str()) => {
                Ok(UpdateReport::Changed { from, to })
            }
            _ => Ok(UpdateReport::AlreadyUpToDate),
        }
    }
}
