// ── Core error types ──
//
// User-facing errors from tunnelbot-core. Store and registry errors abort
// an admin action before reconciliation; reconciliation failures are
// reported on an already-committed change. The `From<tunnelbot_api::Error>`
// impl translates chat transport failures.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("User '{username}' already exists")]
    DuplicateUser { username: String },

    #[error("User '{username}' not found")]
    UserNotFound { username: String },

    #[error("No rule matches {matcher}")]
    RuleNotFound { matcher: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Store errors ─────────────────────────────────────────────────
    #[error("Store {} is corrupt: {reason}", path.display())]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Store I/O error on {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── External tools ───────────────────────────────────────────────
    #[error("{tool} timed out after {timeout_secs}s")]
    ExternalToolTimeout { tool: String, timeout_secs: u64 },

    #[error("{tool} failed ({}): {stderr}", exit_label(*code))]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Artifact {} is missing required fields: {}", path.display(), missing.join(", "))]
    ArtifactMalformed { path: PathBuf, missing: Vec<String> },

    // ── Reconciliation ───────────────────────────────────────────────
    #[error("Change saved but the endpoint did not pick it up: {reason}")]
    ReconcileFailed { reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Chat transport ───────────────────────────────────────────────
    #[error("Chat transport error: {0}")]
    Transport(#[from] tunnelbot_api::Error),
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "no exit code".into(), |c| format!("exit code {c}"))
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StoreCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Whether the error came from admin input rather than the system.
    /// Input errors keep the panel in its prompt state.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateUser { .. }
                | Self::UserNotFound { .. }
                | Self::RuleNotFound { .. }
                | Self::ValidationFailed { .. }
        )
    }
}
