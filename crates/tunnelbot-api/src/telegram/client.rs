// Telegram Bot API HTTP client
//
// Wraps `reqwest::Client` with token-scoped URL construction and
// `{ ok, result }` envelope unwrapping. The token lives in the URL path,
// so URLs are never logged; only method names are.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{
    AnswerCallbackQuery, ApiResponse, EditMessageText, GetUpdates, InlineKeyboardMarkup, Message,
    SendMessage, Update, User,
};
use crate::error::Error;
use crate::transport::TransportConfig;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Updates the bot subscribes to.
const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

/// Extra slack on top of the long-poll timeout before the HTTP request
/// itself is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Raw HTTP client for the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.masked_token())
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a client from a `TransportConfig`. `api_base` overrides the
    /// public Bot API server (self-hosted `telegram-bot-api`).
    pub fn new(
        token: SecretString,
        api_base: Option<&str>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(api_base.unwrap_or(DEFAULT_API_BASE))?;
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, token: SecretString) -> Self {
        Self {
            http,
            base_url,
            token,
        }
    }

    /// The Bot API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The token with everything but its ends masked, for diagnostics.
    pub fn masked_token(&self) -> String {
        let token = self.token.expose_secret();
        let len = token.chars().count();
        if len > 10 {
            let head: String = token.chars().take(5).collect();
            let tail: String = token.chars().skip(len - 4).collect();
            format!("{head}...{tail}")
        } else {
            "***".into()
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/bot{token}/{method}`.
    ///
    /// Built by string concatenation: `Url::join` would parse the
    /// `bot123:` prefix of a token as a URL scheme.
    pub(crate) fn method_url(&self, method: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/bot{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.token.expose_secret(),
            method
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Call a Bot API method with a JSON body and unwrap the envelope.
    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<R, Error> {
        debug!(method, "telegram call");

        let mut req = self.http.post(self.method_url(method)?).json(params);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send().await.map_err(Error::Transport)?;

        Self::parse_envelope(resp).await
    }

    /// Call a Bot API method with multipart form data (file uploads).
    async fn call_multipart<R: DeserializeOwned>(
        &self,
        method: &str,
        form: multipart::Form,
    ) -> Result<R, Error> {
        debug!(method, "telegram multipart call");

        let resp = self
            .http
            .post(self.method_url(method)?)
            .multipart(form)
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::parse_envelope(resp).await
    }

    /// Parse the `{ ok, result }` envelope, returning `result` on success
    /// or an `Error::Api` carrying `error_code` and `description`.
    async fn parse_envelope<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        let envelope: ApiResponse<R> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| Error::Deserialization {
                message: "ok=true but no result".into(),
                body,
            });
        }

        Err(Error::Api {
            code: envelope
                .error_code
                .unwrap_or_else(|| i64::from(status.as_u16())),
            description: envelope
                .description
                .unwrap_or_else(|| "Unknown error".into()),
            retry_after_secs: envelope.parameters.and_then(|p| p.retry_after),
        })
    }

    // ── Methods ──────────────────────────────────────────────────────

    /// `getMe`: the bot's own account, used as a startup token check.
    pub async fn get_me(&self) -> Result<User, Error> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    /// `getUpdates` long poll. Blocks server-side for up to `timeout_secs`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, Error> {
        let params = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let http_timeout = Duration::from_secs(timeout_secs) + POLL_GRACE;
        self.call("getUpdates", &params, Some(http_timeout)).await
    }

    /// `sendMessage` with an optional inline keyboard.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, Error> {
        let params = SendMessage {
            chat_id,
            text,
            reply_markup,
        };
        self.call("sendMessage", &params, None).await
    }

    /// `editMessageText`. The API answers with the edited message or
    /// `true`; neither is needed by callers.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), Error> {
        let params = EditMessageText {
            chat_id,
            message_id,
            text,
            reply_markup,
        };
        let _: serde_json::Value = self.call("editMessageText", &params, None).await?;
        Ok(())
    }

    /// `answerCallbackQuery`, optionally with a toast text.
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), Error> {
        let params = AnswerCallbackQuery {
            callback_query_id,
            text,
        };
        let _: bool = self.call("answerCallbackQuery", &params, None).await?;
        Ok(())
    }

    /// `sendDocument` uploading a local file.
    pub async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<Message, Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "document".into(), |n| n.to_string_lossy().into_owned());

        let mut form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", multipart::Part::bytes(bytes).file_name(file_name));
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_owned());
        }

        self.call_multipart("sendDocument", form).await
    }
}
