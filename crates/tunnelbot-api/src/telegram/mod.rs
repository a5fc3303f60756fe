// Telegram Bot API surface
//
// Only the handful of methods the admin bot needs: long polling,
// message send/edit, callback answers and document uploads.

mod client;
pub mod types;

pub use client::TelegramClient;
pub use types::{
    CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageOrigin,
    Update, User,
};
