//! `tunnelbot reconcile`: explicit retry after a failed reconciliation.

use tunnelbot_core::Backend;

use crate::cli::GlobalOpts;
use crate::error::CliError;

use super::util;

pub async fn handle(backend: &Backend, global: &GlobalOpts) -> Result<(), CliError> {
    let reconciler = backend.reconciler();
    let plan: Vec<&str> = reconciler.strategies().iter().map(|s| s.label()).collect();
    tracing::info!(strategies = ?plan, "reconciling");

    let bar = util::spinner("Reconciling endpoint", global.quiet);
    let outcome = reconciler.reconcile().await;
    bar.finish_and_clear();

    util::settle("Stores reconciled", outcome, global)
}
