//! The chat surface the panel draws on, and its Telegram implementation.

use std::future::Future;
use std::path::Path;

use tunnelbot_api::TelegramClient;
use tunnelbot_api::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::render::Rendered;
use super::state::{ConversationId, MessageHandle};
use crate::error::CoreError;

/// Result of editing the panel message in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditResult {
    /// Edited, or already showing exactly this content.
    Edited,
    /// The message no longer exists or can no longer be edited.
    Gone,
}

/// Outbound operations the panel needs from a chat transport.
pub trait ChatSurface: Send + Sync {
    fn send_panel(
        &self,
        chat: ConversationId,
        view: &Rendered,
    ) -> impl Future<Output = Result<MessageHandle, CoreError>> + Send;

    fn edit_panel(
        &self,
        chat: ConversationId,
        handle: MessageHandle,
        view: &Rendered,
    ) -> impl Future<Output = Result<EditResult, CoreError>> + Send;

    /// Auxiliary message, never treated as the panel.
    fn send_text(
        &self,
        chat: ConversationId,
        text: &str,
    ) -> impl Future<Output = Result<MessageHandle, CoreError>> + Send;

    fn send_document(
        &self,
        chat: ConversationId,
        path: &Path,
        caption: &str,
    ) -> impl Future<Output = Result<MessageHandle, CoreError>> + Send;
}

pub(crate) fn markup(view: &Rendered) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: view
            .keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback.data()))
                    .collect()
            })
            .collect(),
    }
}

impl ChatSurface for TelegramClient {
    async fn send_panel(&self, chat: ConversationId, view: &Rendered) -> Result<MessageHandle, CoreError> {
        let sent = self.send_message(chat, &view.text, Some(&markup(view))).await?;
        Ok(MessageHandle(sent.message_id))
    }

    async fn edit_panel(
        &self,
        chat: ConversationId,
        handle: MessageHandle,
        view: &Rendered,
    ) -> Result<EditResult, CoreError> {
        match self
            .edit_message_text(chat, handle.0, &view.text, Some(&markup(view)))
            .await
        {
            Ok(()) => Ok(EditResult::Edited),
            Err(e) if e.is_not_modified() => Ok(EditResult::Edited),
            Err(e) if e.is_message_gone() => Ok(EditResult::Gone),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_text(&self, chat: ConversationId, text: &str) -> Result<MessageHandle, CoreError> {
        let sent = self.send_message(chat, text, None).await?;
        Ok(MessageHandle(sent.message_id))
    }

    async fn send_document(
        &self,
        chat: ConversationId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle, CoreError> {
        let sent = TelegramClient::send_document(self, chat, path, Some(caption)).await?;
        Ok(MessageHandle(sent.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::action::Callback;
    use crate::panel::render::Button;

    #[test]
    fn markup_carries_callback_data() {
        let view = Rendered {
            text: "x".into(),
            keyboard: vec![vec![Button {
                label: "Users".into(),
                callback: Callback::Users,
            }]],
        };
        let m = markup(&view);
        assert_eq!(m.inline_keyboard[0][0].callback_data.as_deref(), Some("users"));
    }
}
