//! Bot configuration for tunnelbot.
//!
//! `bot.toml` loading (defaults, file, `TUNNELBOT_*` environment), bot
//! token resolution (env var, system keyring, plaintext) and translation
//! into `tunnelbot_core::ServiceConfig`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use tunnelbot_core::{EndpointSettings, ReconcileConfig, ServiceConfig, StorePaths};

const KEYRING_SERVICE: &str = "tunnelbot";
const KEYRING_TOKEN: &str = "telegram-token";
const LOCAL_CONFIG: &str = "bot.toml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no bot token configured (set {env}, run `tunnelbot config set-token`, or set telegram_token)")]
    NoToken { env: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config struct ──────────────────────────────────────────────

/// Everything in `bot.toml`. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotConfig {
    /// Bot token (plaintext; prefer the keyring or an env var).
    pub telegram_token: Option<String>,

    /// Environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub telegram_token_env: String,

    /// Telegram user ids allowed to administer the endpoint.
    #[serde(default)]
    pub admin_ids: Vec<i64>,

    pub credentials_file: Option<PathBuf>,
    pub rules_file: Option<PathBuf>,

    /// HTTP hook for a live reload.
    pub reload_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Restart primitive; the service name is appended.
    #[serde(default = "default_restart_command")]
    pub restart_command: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout: u64,

    #[serde(default = "default_endpoint_binary")]
    pub endpoint_binary: PathBuf,
    #[serde(default = "default_client_binary")]
    pub client_binary: PathBuf,
    pub vpn_config: Option<PathBuf>,
    pub hosts_config: Option<PathBuf>,
    pub endpoint_public_address: Option<String>,
    #[serde(default)]
    pub dns_upstreams: Vec<String>,
    pub artifact_dir: Option<PathBuf>,

    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
    /// Bot API base URL override, e.g. a local Bot API server.
    pub api_base_url: Option<String>,
    /// Outbound proxy for Bot API traffic.
    pub proxy_url: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            telegram_token_env: default_token_env(),
            admin_ids: Vec::new(),
            credentials_file: None,
            rules_file: None,
            reload_endpoint: None,
            service_name: default_service_name(),
            restart_command: default_restart_command(),
            command_timeout: default_command_timeout(),
            reload_timeout: default_reload_timeout(),
            endpoint_binary: default_endpoint_binary(),
            client_binary: default_client_binary(),
            vpn_config: None,
            hosts_config: None,
            endpoint_public_address: None,
            dns_upstreams: Vec::new(),
            artifact_dir: None,
            session_idle_timeout: default_session_idle_timeout(),
            poll_timeout: default_poll_timeout(),
            api_base_url: None,
            proxy_url: None,
        }
    }
}

fn default_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".into()
}
fn default_service_name() -> String {
    "trusttunnel".into()
}
fn default_restart_command() -> Vec<String> {
    vec!["systemctl".into(), "restart".into()]
}
fn default_command_timeout() -> u64 {
    30
}
fn default_reload_timeout() -> u64 {
    5
}
fn default_endpoint_binary() -> PathBuf {
    PathBuf::from("trusttunnel_endpoint")
}
fn default_client_binary() -> PathBuf {
    PathBuf::from("trusttunnel_client")
}
fn default_session_idle_timeout() -> u64 {
    3600
}
fn default_poll_timeout() -> u64 {
    30
}

impl BotConfig {
    /// Translate into the runtime config used by tunnelbot-core.
    pub fn to_service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let credentials = self
            .credentials_file
            .clone()
            .ok_or_else(|| invalid("credentials_file", "must be set"))?;

        let reload_endpoint = self
            .reload_endpoint
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                Url::parse(s).map_err(|e| invalid("reload_endpoint", format!("'{s}': {e}")))
            })
            .transpose()?;

        if reload_endpoint.is_none() && self.restart_command.is_empty() {
            return Err(invalid(
                "restart_command",
                "must not be empty when no reload_endpoint is set",
            ));
        }
        for (field, secs) in [
            ("command_timeout", self.command_timeout),
            ("reload_timeout", self.reload_timeout),
            ("session_idle_timeout", self.session_idle_timeout),
        ] {
            if secs == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        let command_timeout = Duration::from_secs(self.command_timeout);
        let mut endpoint = EndpointSettings {
            endpoint_binary: self.endpoint_binary.clone(),
            client_binary: self.client_binary.clone(),
            vpn_config: self.vpn_config.clone(),
            hosts_config: self.hosts_config.clone(),
            public_address: self.endpoint_public_address.clone(),
            dns_upstreams: self.dns_upstreams.clone(),
            ..EndpointSettings::default()
        };
        if let Some(dir) = &self.artifact_dir {
            endpoint.artifact_dir.clone_from(dir);
        }

        Ok(ServiceConfig {
            stores: StorePaths {
                credentials,
                rules: self.rules_file.clone(),
            },
            endpoint,
            reconcile: ReconcileConfig {
                reload_endpoint,
                reload_timeout: Duration::from_secs(self.reload_timeout),
                service_name: self.service_name.clone(),
                restart_command: self.restart_command.clone(),
                restart_timeout: command_timeout,
            },
            command_timeout,
            admin_ids: self.admin_ids.iter().copied().collect::<HashSet<_>>(),
            session_idle_timeout: Duration::from_secs(self.session_idle_timeout),
        })
    }

    /// Extra checks for running the chat bot, on top of `to_service_config`.
    pub fn ensure_runnable(&self) -> Result<(), ConfigError> {
        if self.admin_ids.is_empty() {
            return Err(invalid("admin_ids", "at least one admin id is required"));
        }
        if self.poll_timeout == 0 {
            return Err(invalid("poll_timeout", "must be greater than zero"));
        }
        if let Some(base) = &self.api_base_url {
            Url::parse(base).map_err(|e| invalid("api_base_url", format!("'{base}': {e}")))?;
        }
        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.telegram_token.is_some() {
            copy.telegram_token = Some("********".into());
        }
        copy
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Platform config file path (XDG on Linux).
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "tunnelbot", "tunnelbot").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push(LOCAL_CONFIG);
            p
        },
        |dirs| dirs.config_dir().join(LOCAL_CONFIG),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tunnelbot");
    p
}

/// `--config` if given, else `./bot.toml` when present, else the platform path.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.is_file() {
        return local;
    }
    config_path()
}

// ── Config loading ──────────────────────────────────────────────────

/// Load defaults, then the TOML file (if it exists), then `TUNNELBOT_*` env.
pub fn load_config(path: &Path) -> Result<BotConfig, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(BotConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TUNNELBOT_"));

    let config: BotConfig = figment.extract()?;
    Ok(config)
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bot token: named env var, then keyring, then plaintext.
pub fn resolve_token(config: &BotConfig) -> Result<SecretString, ConfigError> {
    // 1. Env var named by telegram_token_env
    if let Ok(val) = std::env::var(&config.telegram_token_env) {
        if !val.trim().is_empty() {
            return Ok(SecretString::from(val.trim().to_owned()));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(token) = config.telegram_token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(SecretString::from(token.to_owned()));
    }

    Err(ConfigError::NoToken {
        env: config.telegram_token_env.clone(),
    })
}

/// Store the bot token in the system keyring.
pub fn store_token(token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN)
        .map_err(|e| ConfigError::Keyring(e.to_string()))?;
    entry
        .set_password(token)
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}
