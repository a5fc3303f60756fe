//! `tunnelbot run`: the Telegram long-poll loop.
//!
//! One task polls `getUpdates` and hands each update to the dispatcher.
//! Idle panel sessions are swept on a timer and their panels closed.

mod dispatcher;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tunnelbot_api::{TelegramClient, TransportConfig};
use tunnelbot_config::resolve_token;
use tunnelbot_core::CoreError;
use tunnelbot_core::panel::{PanelMachine, PanelSessions};

use crate::config::Loaded;
use crate::error::CliError;

use self::dispatcher::Dispatcher;

const POLL_BACKOFF: Duration = Duration::from_secs(5);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(loaded: &Loaded) -> Result<(), CliError> {
    loaded.config.ensure_runnable()?;
    let backend = loaded.backend()?;
    let token: SecretString = resolve_token(&loaded.config)?;

    let transport = TransportConfig {
        proxy: loaded.config.proxy_url.clone(),
        ..TransportConfig::default()
    };
    let client = TelegramClient::new(token, loaded.config.api_base_url.as_deref(), &transport)
        .map_err(CoreError::from)?;
    let me = client.get_me().await.map_err(CoreError::from)?;
    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        admins = backend.config().admin_ids.len(),
        rules = backend.rules_enabled(),
        "bot started"
    );

    let session_idle = backend.config().session_idle_timeout;
    let idle = chrono::Duration::from_std(session_idle).unwrap_or_else(|_| chrono::Duration::days(1));
    let poll_timeout = loaded.config.poll_timeout;

    let sessions = Arc::new(PanelSessions::new());
    let machine = Arc::new(PanelMachine::new(backend, client.clone()));
    let mut dispatcher = Dispatcher::new(
        client.clone(),
        Arc::clone(&machine),
        Arc::clone(&sessions),
        session_idle,
    );

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.tick().await; // consume the immediate first tick
    let mut offset: Option<i64> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = sweep.tick() => {
                for mut state in sessions.take_idle(Utc::now(), idle).await {
                    info!(conversation = state.conversation, "closing idle session");
                    if let Err(e) = machine.close(&mut state).await {
                        warn!(conversation = state.conversation, error = %e, "closing idle panel failed");
                    }
                }
            }
            polled = client.get_updates(offset, poll_timeout) => match polled {
                Ok(updates) => {
                    for update in &updates {
                        offset = Some(update.update_id + 1);
                        dispatcher.dispatch(update).await;
                    }
                }
                Err(e) => {
                    let wait = e.retry_after().map_or(POLL_BACKOFF, Duration::from_secs);
                    warn!(error = %e, retry_in = ?wait, "getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            },
        }
    }

    dispatcher.shutdown().await;
    info!(open_sessions = sessions.len(), "bot stopped");
    Ok(())
}
