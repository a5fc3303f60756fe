//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use tunnelbot_core::ReconcileOutcome;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Spinner on stderr while an external tool runs. Hidden when quiet or
/// not attached to a terminal.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Report how a committed change reached the endpoint. A failed
/// reconciliation becomes the command's error (exit code 9); the change
/// itself stays on disk.
pub fn settle(subject: &str, outcome: ReconcileOutcome, global: &GlobalOpts) -> Result<(), CliError> {
    match outcome {
        ReconcileOutcome::Failed { reason } => Err(CliError::ReconcileFailed { reason }),
        done => {
            output::status(&format!("{subject}; {done}"), true, global.color, global.quiet);
            Ok(())
        }
    }
}
