//! Command dispatch: bridges CLI args -> core registries -> output formatting.

pub mod config_cmd;
pub mod export;
pub mod reconcile;
pub mod rules;
pub mod users;
pub mod util;

use tunnelbot_core::Backend;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a store-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, backend: &Backend, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Users(args) => users::handle(backend, args, global).await,
        Command::Rules(args) => rules::handle(backend, args, global).await,
        Command::Export(args) => export::handle(backend, args, global).await,
        Command::Reconcile => reconcile::handle(backend, global).await,
        // Run, Config and Completions are handled before dispatch
        Command::Run(_) | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
