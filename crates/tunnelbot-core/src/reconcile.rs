// ── Service reconciliation ──
//
// After a store file changes, make the endpoint observe it. Strategies are
// tried in order, each under its own deadline, stopping at the first that
// succeeds: a live reload through the HTTP hook when one is configured,
// then a supervised restart.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};
use tunnelbot_api::{ReloadClient, TransportConfig};
use url::Url;

use crate::config::ReconcileConfig;
use crate::error::CoreError;
use crate::process::run_tool;

/// One way of getting the endpoint to re-read its stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    LiveReload {
        endpoint: Url,
        timeout: Duration,
    },
    /// `command... service`, e.g. `systemctl restart trusttunnel`.
    Restart {
        command: Vec<String>,
        service: String,
        timeout: Duration,
    },
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LiveReload { .. } => "live reload",
            Self::Restart { .. } => "restart",
        }
    }
}

/// What reconciliation achieved for a committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    ReloadedLive,
    Restarted,
    /// Every strategy failed; the change is on disk but not live.
    Failed { reason: String },
}

impl ReconcileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Turn `Failed` into `CoreError::ReconcileFailed`.
    pub fn into_result(self) -> Result<Self, CoreError> {
        match self {
            Self::Failed { reason } => Err(CoreError::ReconcileFailed { reason }),
            other => Ok(other),
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReloadedLive => f.write_str("endpoint reloaded live"),
            Self::Restarted => f.write_str("endpoint service restarted"),
            Self::Failed { reason } => write!(f, "endpoint not reconciled: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    strategies: Vec<Strategy>,
    reload: ReloadClient,
}

impl Reconciler {
    pub fn new(config: &ReconcileConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.reload_timeout);
        let reload = ReloadClient::new(&transport)?;
        Ok(Self::with_reload_client(config, reload))
    }

    pub fn with_reload_client(config: &ReconcileConfig, reload: ReloadClient) -> Self {
        let mut strategies = Vec::with_capacity(2);
        if let Some(endpoint) = &config.reload_endpoint {
            strategies.push(Strategy::LiveReload {
                endpoint: endpoint.clone(),
                timeout: config.reload_timeout,
            });
        }
        if !config.restart_command.is_empty() {
            strategies.push(Strategy::Restart {
                command: config.restart_command.clone(),
                service: config.service_name.clone(),
                timeout: config.restart_timeout,
            });
        }
        Self { strategies, reload }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Try each strategy in order. Never fails; a total failure is
    /// reported as `ReconcileOutcome::Failed`.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        if self.strategies.is_empty() {
            warn!("no reconciliation strategy configured");
            return ReconcileOutcome::Failed {
                reason: "no reload endpoint or restart command configured".into(),
            };
        }

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match self.attempt(strategy).await {
                Ok(outcome) => {
                    info!(strategy = strategy.label(), "endpoint reconciled");
                    return outcome;
                }
                Err(reason) => {
                    warn!(strategy = strategy.label(), %reason, "reconcile attempt failed");
                    failures.push(format!("{}: {reason}", strategy.label()));
                }
            }
        }

        ReconcileOutcome::Failed {
            reason: failures.join("; "),
        }
    }

    async fn attempt(&self, strategy: &Strategy) -> Result<ReconcileOutcome, String> {
        match strategy {
            Strategy::LiveReload { endpoint, timeout } => {
                match tokio::time::timeout(*timeout, self.reload.trigger(endpoint)).await {
                    Ok(Ok(())) => Ok(ReconcileOutcome::ReloadedLive),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
                }
            }
            Strategy::Restart {
                command,
                service,
                timeout,
            } => {
                let Some((program, prefix)) = command.split_first() else {
                    return Err("restart command is empty".into());
                };
                let args = prefix.iter().chain(std::iter::once(service));
                run_tool(program, args, *timeout)
                    .await
                    .map(|_| ReconcileOutcome::Restarted)
                    .map_err(|e| e.to_string())
            }
        }
    }
}
