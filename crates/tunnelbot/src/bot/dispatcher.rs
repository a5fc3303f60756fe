//! Update routing: admin gate and `Update` -> `PanelEvent` mapping.
//! Authorized events go to the per-conversation workers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use tunnelbot_api::TelegramClient;
use tunnelbot_api::telegram::{Message, Update};
use tunnelbot_core::ServiceConfig;
use tunnelbot_core::panel::{
    Callback, ConversationId, ConversationWorkers, PanelEvent, PanelMachine, PanelSessions,
};

const DENIED: &str = "Access denied.";
const EXPIRED: &str = "That button has expired. Send /start to open a fresh panel.";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do with one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Routed {
    /// An authorized event for a conversation's panel.
    Event {
        chat: ConversationId,
        event: PanelEvent,
        callback_id: Option<String>,
    },
    /// The sender is not an admin.
    Denied {
        user_id: i64,
        chat: Option<ConversationId>,
        callback_id: Option<String>,
    },
    /// Nothing the panel reacts to. Callbacks still get answered.
    Ignored {
        callback_id: Option<String>,
        toast: Option<&'static str>,
    },
}

/// Classify an update. The admin check runs before anything else is
/// looked at.
pub(crate) fn route(update: &Update, config: &ServiceConfig) -> Routed {
    if let Some(query) = &update.callback_query {
        let callback_id = Some(query.id.clone());
        let chat = query.message.as_ref().map(|m| m.chat.id);
        if !config.is_admin(query.from.id) {
            return Routed::Denied {
                user_id: query.from.id,
                chat,
                callback_id,
            };
        }
        let parsed = query.data.as_deref().and_then(Callback::parse);
        return match (chat, parsed) {
            (Some(chat), Some(callback)) => Routed::Event {
                chat,
                event: PanelEvent::Callback(callback),
                callback_id,
            },
            _ => Routed::Ignored {
                callback_id,
                toast: Some(EXPIRED),
            },
        };
    }

    let Some(message) = &update.message else {
        return Routed::Ignored {
            callback_id: None,
            toast: None,
        };
    };
    let Some(sender) = &message.from else {
        return Routed::Ignored {
            callback_id: None,
            toast: None,
        };
    };
    if !config.is_admin(sender.id) {
        return Routed::Denied {
            user_id: sender.id,
            chat: Some(message.chat.id),
            callback_id: None,
        };
    }

    match message_event(message) {
        Some(event) => Routed::Event {
            chat: message.chat.id,
            event,
            callback_id: None,
        },
        None => Routed::Ignored {
            callback_id: None,
            toast: None,
        },
    }
}

fn message_event(message: &Message) -> Option<PanelEvent> {
    if message.is_forward() {
        let origin = message.forwarded_user();
        return Some(PanelEvent::Forwarded {
            username: origin.and_then(|u| u.username.clone()),
            user_id: origin.map(|u| u.id),
        });
    }
    let text = message.text.as_deref()?.trim();
    if text.starts_with('/') {
        // Unknown commands are dropped rather than read as prompt input.
        return PanelEvent::from_command(text);
    }
    (!text.is_empty()).then(|| PanelEvent::Text(text.to_owned()))
}

/// Driven from the poll loop only.
pub struct Dispatcher {
    client: TelegramClient,
    workers: ConversationWorkers<TelegramClient>,
}

impl Dispatcher {
    /// Idle workers exit after `linger`.
    pub fn new(
        client: TelegramClient,
        machine: Arc<PanelMachine<TelegramClient>>,
        sessions: Arc<PanelSessions>,
        linger: Duration,
    ) -> Self {
        Self {
            client,
            workers: ConversationWorkers::new(machine, sessions, linger),
        }
    }

    pub async fn dispatch(&mut self, update: &Update) {
        match route(update, self.workers.machine().backend().config()) {
            Routed::Event {
                chat,
                event,
                callback_id,
            } => {
                if let Some(id) = callback_id {
                    self.answer(id, None);
                }
                self.workers.enqueue(chat, event);
            }
            Routed::Denied {
                user_id,
                chat,
                callback_id,
            } => {
                info!(user_id, "rejected update from non-admin");
                if let Some(id) = callback_id {
                    self.answer(id, Some(DENIED));
                } else if let Some(chat) = chat {
                    if let Err(e) = self.client.send_message(chat, DENIED, None).await {
                        debug!(error = %e, "denial not delivered");
                    }
                }
            }
            Routed::Ignored { callback_id, toast } => {
                if let Some(id) = callback_id {
                    self.answer(id, toast);
                }
            }
        }
    }

    /// Acknowledge a button press off the poll loop.
    fn answer(&self, callback_id: String, text: Option<&'static str>) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.answer_callback_query(&callback_id, text).await {
                debug!(error = %e, "callback answer failed");
            }
        });
    }

    /// Wait for queued events to finish, then stop every worker.
    pub async fn shutdown(self) {
        self.workers.shutdown(DRAIN_TIMEOUT).await;
    }
}
