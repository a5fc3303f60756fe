use thiserror::Error;

/// Top-level error type for the `tunnelbot-api` crate.
///
/// Covers every failure mode of the outbound HTTP surfaces: the Telegram
/// Bot API and the endpoint's live-reload hook. `tunnelbot-core` maps these
/// into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be built (bad proxy, TLS backend failure).
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Telegram Bot API ────────────────────────────────────────────
    /// Structured error from the Bot API (`{ok: false, error_code, description}`).
    #[error("Telegram API error {code}: {description}")]
    Api {
        code: i64,
        description: String,
        retry_after_secs: Option<u64>,
    },

    // ── Reload hook ─────────────────────────────────────────────────
    /// The reload endpoint answered with a non-success status.
    #[error("Reload endpoint rejected the request (HTTP {status})")]
    ReloadRejected { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Local file access failed (document uploads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Returns `true` when an edit was a no-op because the content is unchanged.
    pub fn is_not_modified(&self) -> bool {
        matches!(
            self,
            Self::Api { code: 400, description, .. } if description.contains("message is not modified")
        )
    }

    /// Returns `true` when the target message can no longer be edited
    /// (deleted by the user, or too old).
    pub fn is_message_gone(&self) -> bool {
        match self {
            Self::Api {
                code: 400,
                description,
                ..
            } => {
                description.contains("message to edit not found")
                    || description.contains("message can't be edited")
                    || description.contains("MESSAGE_ID_INVALID")
            }
            _ => false,
        }
    }

    /// Seconds the Bot API asked us to wait before retrying, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Api {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}
