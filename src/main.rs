use args::{parse_args, Args};
use ensure_update::{
    clock::SystemClock,
    start::{start_locked, Options, EXIT_SUCCESS, EXIT_USAGE},
    store::file::FileStore,
    updater::git::GitUpdater,
};
use gumdrop::Options as _;
use logger::init_logger;
use std::{
    env, fs,
    path::{self, PathBuf},
    process,
    time::Duration,
};
use thiserror::Error;

mod args;
mod logger;

const APP_NAME: &str = "ensure-update";
/// How long to wait for another run on the same repository without an update timeout.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Extra time to wait for another run on top of its update timeout.
const LOCK_GRACE: Duration = Duration::from_secs(30);

/// A custom error for the invalid invocations, these exit before touching anything.
#[derive(Debug, Error)]
pub enum MainError {
    #[error("{0}")]
    InvalidArguments(#[from] gumdrop::Error),
    #[error("You have to pass a directory to update.")]
    MissingDirectory,
    #[error("{0} is not a directory ({1}).")]
    InvalidDirectory(String, String),
    #[error("Cannot use {0} as the state directory ({1}).")]
    InvalidStateDirectory(String, String),
    #[error("Cannot find a directory to store the update times, pass --state-dir.")]
    NoStateDirectory,
    #[error("Cannot start the logger: {0}.")]
    FailedLogger(#[from] log::SetLoggerError),
}

fn main() {
    let raw_args: Vec<String> = env::args().skip(1).collect();

    let code = match run(&raw_args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{APP_NAME}: {err}");
            eprintln!("Run {APP_NAME} --help for the usage.");
            EXIT_USAGE
        }
    };

    process::exit(code);
}

fn run(raw_args: &[String]) -> Result<i32, MainError> {
    let args = parse_args(raw_args)?;

    if args.help {
        println!("Usage: {APP_NAME} [OPTIONS] <DIRECTORY>\n\n{}", Args::usage());
        return Ok(EXIT_SUCCESS);
    }
    if args.version {
        println!("{APP_NAME} {}", env!("CARGO_PKG_VERSION"));
        return Ok(EXIT_SUCCESS);
    }

    // Setup everything that can fail on user input, before touching any state.
    let directory = args
        .directory
        .as_deref()
        .ok_or(MainError::MissingDirectory)?;
    let target = resolve_directory(directory)?;
    let state_dir = resolve_state_dir(args.state_dir.as_deref())?;

    if let Err(err) = init_logger(&args) {
        if !args.quiet {
            eprintln!("{APP_NAME}: {err}");
        }
    }

    let timeout = (!args.timeout.is_zero()).then(|| Duration::from(args.timeout));
    let options = Options {
        interval: args.interval.into(),
        force: args.force,
    };
    let store = FileStore::new(state_dir);
    let updater = GitUpdater::new(args.command.clone(), timeout);

    let lock_timeout = timeout.map_or(DEFAULT_LOCK_TIMEOUT, |timeout| timeout + LOCK_GRACE);
    let outcome = start_locked(
        &store.lock_path(&target),
        lock_timeout,
        &target,
        &options,
        &store,
        &updater,
        &SystemClock,
    );

    Ok(outcome.exit_code())
}

/// Normalize the directory, so the same repository is always recorded the same way.
fn resolve_directory(directory: &str) -> Result<PathBuf, MainError> {
    let target = fs::canonicalize(directory)
        .map_err(|err| MainError::InvalidDirectory(directory.to_string(), err.to_string()))?;

    if !target.is_dir() {
        return Err(MainError::InvalidDirectory(
            directory.to_string(),
            String::from("it is a file"),
        ));
    }

    Ok(target)
}

fn resolve_state_dir(state_dir: Option<&str>) -> Result<PathBuf, MainError> {
    match state_dir {
        Some(state_dir) => path::absolute(state_dir)
            .map_err(|err| MainError::InvalidStateDirectory(state_dir.to_string(), err.to_string())),
        None => dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|directory| directory.join(APP_NAME))
            .ok_or(MainError::NoStateDirectory),
    }
}
