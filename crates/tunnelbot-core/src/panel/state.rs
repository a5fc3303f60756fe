//! Per-conversation panel state.

use chrono::{DateTime, Utc};

use super::view::PanelView;
use crate::store::Rule;

/// Telegram chat id of the admin conversation.
pub type ConversationId = i64;

/// Message id of a message the bot sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub i64);

/// One-shot status line shown above the panel body after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

/// What a confirm view is about to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    User(String),
    /// The rule as it was when picked, with its 1-based position.
    Rule { position: usize, rule: Rule },
}

#[derive(Debug, Clone)]
pub struct PanelState {
    pub conversation: ConversationId,
    pub view: PanelView,
    /// The one panel message. `None` until first shown or after it is lost.
    pub panel: Option<MessageHandle>,
    pub target: Option<Target>,
    pub notice: Option<Notice>,
    /// The last committed change has not been reconciled yet.
    pub reconcile_pending: bool,
    pub last_active: DateTime<Utc>,
    /// Set once the session has been ended or evicted. A closed state is
    /// never drawn again.
    pub closed: bool,
}

impl PanelState {
    pub fn new(conversation: ConversationId) -> Self {
        Self {
            conversation,
            view: PanelView::MainMenu,
            panel: None,
            target: None,
            notice: None,
            reconcile_pending: false,
            last_active: Utc::now(),
            closed: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Switch view, dropping any confirm target.
    pub fn go(&mut self, view: PanelView) {
        self.view = view;
        self.target = None;
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice::Info(text.into()));
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice::Error(text.into()));
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle: chrono::Duration) -> bool {
        now - self.last_active >= idle
    }
}
