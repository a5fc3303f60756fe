//! Inbound panel events and the callback data carried by panel buttons.

/// Telegram rejects buttons with longer callback data.
pub const MAX_CALLBACK_BYTES: usize = 64;

/// Button presses, encoded in Telegram callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Menu,
    Users,
    AddUser,
    /// Pick a user for deletion.
    PickUser(String),
    ConfirmDeleteUser,
    /// Export straight from the user list.
    ExportUser(String),
    Rules,
    AddRule,
    /// Pick a rule (1-based position) for deletion.
    PickRule(usize),
    ConfirmDeleteRule,
    /// Send the whole rule list as plain messages.
    DumpRules,
    Export,
    /// Run reconciliation again after a failure.
    Reconcile,
}

impl Callback {
    pub fn parse(data: &str) -> Option<Self> {
        let parsed = match data {
            "menu" => Self::Menu,
            "users" => Self::Users,
            "users:add" => Self::AddUser,
            "users:delete" => Self::ConfirmDeleteUser,
            "rules" => Self::Rules,
            "rules:add" => Self::AddRule,
            "rules:delete" => Self::ConfirmDeleteRule,
            "rules:dump" => Self::DumpRules,
            "export" => Self::Export,
            "reconcile" => Self::Reconcile,
            other => {
                if let Some(name) = other.strip_prefix("users:pick:") {
                    Self::PickUser(name.to_owned())
                } else if let Some(name) = other.strip_prefix("users:export:") {
                    Self::ExportUser(name.to_owned())
                } else if let Some(pos) = other.strip_prefix("rules:pick:") {
                    Self::PickRule(pos.parse().ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(parsed)
    }

    pub fn data(&self) -> String {
        match self {
            Self::Menu => "menu".into(),
            Self::Users => "users".into(),
            Self::AddUser => "users:add".into(),
            Self::PickUser(name) => format!("users:pick:{name}"),
            Self::ConfirmDeleteUser => "users:delete".into(),
            Self::ExportUser(name) => format!("users:export:{name}"),
            Self::Rules => "rules".into(),
            Self::AddRule => "rules:add".into(),
            Self::PickRule(pos) => format!("rules:pick:{pos}"),
            Self::ConfirmDeleteRule => "rules:delete".into(),
            Self::DumpRules => "rules:dump".into(),
            Self::Export => "export".into(),
            Self::Reconcile => "reconcile".into(),
        }
    }

    /// Whether the encoded data is short enough to put on a button.
    pub fn fits(&self) -> bool {
        self.data().len() <= MAX_CALLBACK_BYTES
    }
}

/// Everything the panel reacts to, already authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// `/start`: open (or reopen) the main menu.
    Start,
    /// `/menu`
    Menu,
    /// `/cancel`: abandon any prompt.
    Cancel,
    /// `/stop`: close the panel and end the session.
    End,
    Callback(Callback),
    Text(String),
    /// A forwarded message; `username` is the original sender's handle
    /// and `user_id` their numeric id, when visible.
    Forwarded {
        username: Option<String>,
        user_id: Option<i64>,
    },
}

impl PanelEvent {
    /// Short label for logs. Text payloads may hold passwords and are
    /// never logged.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Menu => "menu",
            Self::Cancel => "cancel",
            Self::End => "end",
            Self::Callback(_) => "callback",
            Self::Text(_) => "text",
            Self::Forwarded { .. } => "forward",
        }
    }

    /// Map a slash command (`/start@my_bot` included) to an event.
    pub fn from_command(text: &str) -> Option<Self> {
        let command = text.split_whitespace().next()?.strip_prefix('/')?;
        let command = command.split('@').next().unwrap_or(command);
        match command {
            "start" => Some(Self::Start),
            "menu" => Some(Self::Menu),
            "cancel" => Some(Self::Cancel),
            "stop" => Some(Self::End),
            _ => None,
        }
    }
}
