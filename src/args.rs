use ensure_update::{interval::Interval, updater::command::DEFAULT_UPDATE_COMMAND};
use gumdrop::Options;

/// Pull a git repository, but only if it hasn't been updated recently.
#[derive(Debug, Options)]
pub struct Args {
    /// The git repository to update.
    #[options(free)]
    pub directory: Option<String>,

    /// Update even if the last update is recent.
    #[options()]
    pub force: bool,

    /// How old the last update can be before updating again.
    ///
    /// Can be a number postfixed with s(econds), m(inutes), h(ours), d(ays),
    /// several of these (e.g. 2h30m), or a plain number of hours.
    #[options(default = "8h")]
    pub interval: Interval,

    /// Stop the update if it takes longer than this, 0 to wait forever.
    #[options(default = "5m")]
    pub timeout: Interval,

    /// The command to run in the repository to update it.
    #[options(default = "git pull")]
    pub command: String,

    /// The directory to store the update times in.
    #[options(no_short, meta = "DIR")]
    pub state_dir: Option<String>,

    /// Print the status and the output of the update, can be set multiple times (-v status, -vv debug, -vvv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Don't print anything, not even errors.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

/// Parse the arguments without exiting, so invalid ones can map to the usage exit code.
pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<Args, gumdrop::Error> {
    Args::parse_args_default(args)
}
