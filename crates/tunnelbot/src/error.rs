//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use tunnelbot_config::ConfigError;
use tunnelbot_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const RECONCILE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(tunnelbot::not_found),
        help("Run: tunnelbot {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(tunnelbot::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tunnelbot::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(tunnelbot::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Stores & tools ───────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(tunnelbot::store),
        help("Check the store file and its directory permissions.")
    )]
    Store { message: String },

    #[error("{tool} timed out after {seconds}s")]
    #[diagnostic(
        code(tunnelbot::timeout),
        help("Raise command_timeout in bot.toml or check the tool by hand.")
    )]
    Timeout { tool: String, seconds: u64 },

    #[error("{message}")]
    #[diagnostic(code(tunnelbot::tool_failed))]
    ToolFailed { message: String },

    #[error("Change saved but the endpoint did not pick it up: {reason}")]
    #[diagnostic(
        code(tunnelbot::reconcile_failed),
        help("Fix the endpoint service, then run: tunnelbot reconcile")
    )]
    ReconcileFailed { reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(tunnelbot::no_config),
        help("Create bot.toml with at least credentials_file set.\nExpected at: {path}")
    )]
    NoConfig { path: String },

    #[error("{message}")]
    #[diagnostic(code(tunnelbot::config))]
    Config { message: String },

    #[error("No bot token configured")]
    #[diagnostic(
        code(tunnelbot::no_token),
        help("Set {env}, run: tunnelbot config set-token, or set telegram_token in bot.toml.")
    )]
    NoToken { env: String },

    // ── Chat transport ───────────────────────────────────────────────
    #[error("Telegram API error: {message}")]
    #[diagnostic(
        code(tunnelbot::transport),
        help("Check network access to the Bot API and the bot token.")
    )]
    Transport { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {reason}")]
    #[diagnostic(code(tunnelbot::render))]
    Render { reason: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ReconcileFailed { .. } => exit_code::RECONCILE,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::NoToken { .. } => exit_code::AUTH,
            Self::Transport { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateUser { username } => CliError::Conflict {
                resource_type: "User".into(),
                identifier: username,
            },
            CoreError::UserNotFound { username } => CliError::NotFound {
                resource_type: "User".into(),
                identifier: username,
                list_command: "users list".into(),
            },
            CoreError::RuleNotFound { matcher } => CliError::NotFound {
                resource_type: "Rule".into(),
                identifier: matcher,
                list_command: "rules list".into(),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::ExternalToolTimeout { tool, timeout_secs } => CliError::Timeout {
                tool,
                seconds: timeout_secs,
            },
            CoreError::ReconcileFailed { reason } => CliError::ReconcileFailed { reason },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Transport(e) => CliError::Transport {
                message: e.to_string(),
            },
            e @ (CoreError::StoreCorrupt { .. } | CoreError::StoreIo { .. }) => CliError::Store {
                message: e.to_string(),
            },
            e @ (CoreError::ExternalToolFailed { .. } | CoreError::ArtifactMalformed { .. }) => {
                CliError::ToolFailed {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoToken { env } => CliError::NoToken { env },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_stable_exit_codes() {
        let cases = [
            (
                CoreError::UserNotFound {
                    username: "bob".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::DuplicateUser {
                    username: "bob".into(),
                },
                exit_code::CONFLICT,
            ),
            (
                CoreError::ExternalToolTimeout {
                    tool: "trusttunnel_endpoint".into(),
                    timeout_secs: 30,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::ReconcileFailed {
                    reason: "restart: exit code 1".into(),
                },
                exit_code::RECONCILE,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }
}
