use duct::{cmd, Expression};
use log::{trace, warn};

/// The command pulling the changes, unless the user gives a different one.
pub const DEFAULT_UPDATE_COMMAND: &str = "git pull";

/// Split the update command into the program name and a runnable expression.
///
/// The command is not run in a shell, returns `None` if it is empty or the quoting is broken.
pub fn create_command(original_command: &str) -> Option<(String, Expression)> {
    let contains_suspicious = original_command.contains(" | ")
        || original_command.contains(" && ")
        || original_command.contains(" || ")
        || original_command.contains(';');
    if contains_suspicious {
        warn!("The command {original_command:?} contains shell-specific characters, but it doesn't run in a shell: wrap it in `sh -c`.")
    }

    let split_args = shlex::split(original_command)?;
    let (command, args) = split_args.split_first()?;
    let expression = cmd(command, args);

    trace!("Parsed {original_command:?} to {expression:?}.");

    Some((command.clone(), expression))
}
