//! Error display for the CLI.

use colored::Colorize;

use stratus_hibernate::error::ActuatorError;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(actuator_err) = err.downcast_ref::<ActuatorError>() {
        match actuator_err {
            ActuatorError::Partial { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Power actions are idempotent; re-run to retry the failed instances."
                        .yellow()
                );
            }
            ActuatorError::Cancelled { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The operation was interrupted before finishing; re-run to continue."
                        .yellow()
                );
            }
            ActuatorError::Provider { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The cloud API did not cooperate; check connectivity and service health."
                        .yellow()
                );
            }
            err if err.is_config() => {
                eprintln!(
                    "\n{}",
                    "Hint: Check the cluster descriptor and clouds file; retrying will not help."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
