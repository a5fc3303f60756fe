// tunnelbot-api: Async clients for the Telegram Bot API and the endpoint reload hook

pub mod error;
pub mod reload;
pub mod telegram;
pub mod transport;

pub use error::Error;
pub use reload::ReloadClient;
pub use telegram::TelegramClient;
pub use transport::TransportConfig;
