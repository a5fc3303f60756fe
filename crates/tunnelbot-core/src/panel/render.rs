//! Pure rendering of a panel state into message text and buttons.

use std::fmt::Write as _;

use super::action::Callback;
use super::state::{Notice, PanelState, Target};
use super::view::PanelView;
use crate::store::{Rule, format_summary};

/// Rules listed inline on the panel; the rest are reachable via the dump.
pub const MAX_INLINE_RULES: usize = 20;
/// Users listed on the panel, two buttons each.
pub const MAX_INLINE_USERS: usize = 40;
/// Panel text budget. Telegram allows 4096 UTF-16 units per message.
pub const MAX_TEXT_CHARS: usize = 4000;
/// Notices longer than this are cut so the view body stays visible.
const MAX_NOTICE_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub callback: Callback,
}

impl Button {
    fn new(label: impl Into<String>, callback: Callback) -> Self {
        Self {
            label: label.into(),
            callback,
        }
    }
}

/// Text plus inline keyboard for the panel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

/// Store contents the current view needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewData {
    pub users: Vec<String>,
    pub rules: Vec<Rule>,
    pub rules_enabled: bool,
}

pub fn render(state: &PanelState, data: &ViewData) -> Rendered {
    let mut text = String::from(state.view.title());
    text.push_str("\n\n");
    match &state.notice {
        Some(Notice::Info(msg)) => {
            let _ = write!(text, "✅ {}\n\n", clip(msg, MAX_NOTICE_CHARS));
        }
        Some(Notice::Error(msg)) => {
            let _ = write!(text, "⚠️ {}\n\n", clip(msg, MAX_NOTICE_CHARS));
        }
        None => {}
    }

    let mut keyboard = match state.view {
        PanelView::MainMenu => main_menu(&mut text, data),
        PanelView::UserList => user_list(&mut text, data),
        PanelView::AddUserPrompt => {
            text.push_str(
                "Send a username, optionally followed by a password, \
                 or forward a message from the person to add.\n\
                 A password is generated when none is given.",
            );
            vec![vec![Button::new("✖ Cancel", Callback::Users)]]
        }
        PanelView::DeleteUserConfirm => {
            let name = match &state.target {
                Some(Target::User(name)) => name.as_str(),
                _ => "?",
            };
            let _ = write!(text, "Delete user {name}? Their VPN access stops immediately.");
            vec![vec![
                Button::new("🗑 Delete", Callback::ConfirmDeleteUser),
                Button::new("✖ Cancel", Callback::Users),
            ]]
        }
        PanelView::RuleList => rule_list(&mut text, data),
        PanelView::AddRulePrompt => {
            text.push_str(
                "Send a rule as:\n<cidr> [prefix=<hex>] <allow|deny>\n\
                 or prefix=<hex> <allow|deny>\n\n\
                 Example: 10.3.2.1/32 allow",
            );
            vec![vec![Button::new("✖ Cancel", Callback::Rules)]]
        }
        PanelView::DeleteRuleConfirm => {
            match &state.target {
                Some(Target::Rule { position, rule }) => {
                    let _ = write!(text, "Delete rule #{position}?\n{rule}");
                }
                _ => text.push_str("Delete rule?"),
            }
            vec![vec![
                Button::new("🗑 Delete", Callback::ConfirmDeleteRule),
                Button::new("✖ Cancel", Callback::Rules),
            ]]
        }
        PanelView::ExportConfigPrompt => {
            text.push_str("Send the username to export configs for.");
            vec![vec![Button::new("✖ Cancel", Callback::Menu)]]
        }
    };

    if state.reconcile_pending {
        keyboard.push(vec![Button::new("🔄 Retry reconcile", Callback::Reconcile)]);
    }

    Rendered {
        text: clip(text.trim_end(), MAX_TEXT_CHARS),
        keyboard,
    }
}

/// Cut `text` to at most `limit` characters, ending the cut with `…`.
pub(crate) fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut clipped: String = text.chars().take(limit.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

fn main_menu(text: &mut String, data: &ViewData) -> Vec<Vec<Button>> {
    text.push_str("Choose an action.");
    let mut rows = vec![vec![
        Button::new("👥 Users", Callback::Users),
        Button::new("➕ Add user", Callback::AddUser),
    ]];
    if data.rules_enabled {
        rows.push(vec![Button::new("📜 Rules", Callback::Rules)]);
    }
    rows.push(vec![Button::new("📦 Export config", Callback::Export)]);
    rows
}

fn user_list(text: &mut String, data: &ViewData) -> Vec<Vec<Button>> {
    if data.users.is_empty() {
        text.push_str("No users yet.");
    } else {
        let _ = write!(text, "{} user(s). Tap 🗑 to delete or 📦 to export.", data.users.len());
        if data.users.len() > MAX_INLINE_USERS {
            let _ = write!(text, "\nShowing the first {MAX_INLINE_USERS}.");
        }
    }

    // Both buttons carry the name; the export one is the longer encoding.
    let (shown, unbuttoned): (Vec<&String>, Vec<&String>) = data
        .users
        .iter()
        .take(MAX_INLINE_USERS)
        .partition(|name| Callback::ExportUser((*name).clone()).fits());
    if !unbuttoned.is_empty() {
        let _ = write!(
            text,
            "\n{} name(s) are too long for buttons; manage them with the tunnelbot CLI.",
            unbuttoned.len()
        );
    }

    let mut rows: Vec<Vec<Button>> = shown
        .into_iter()
        .map(|name| {
            vec![
                Button::new(format!("🗑 {name}"), Callback::PickUser(name.clone())),
                Button::new(format!("📦 {name}"), Callback::ExportUser(name.clone())),
            ]
        })
        .collect();
    rows.push(vec![
        Button::new("➕ Add user", Callback::AddUser),
        Button::new("⬅ Back", Callback::Menu),
    ]);
    rows
}

fn rule_list(text: &mut String, data: &ViewData) -> Vec<Vec<Button>> {
    if data.rules.is_empty() {
        text.push_str("No rules. Every client is allowed.");
    } else {
        for (idx, line) in format_summary(&data.rules).take(MAX_INLINE_RULES).enumerate() {
            let _ = writeln!(text, "{}. {line}", idx + 1);
        }
        let hidden = data.rules.len().saturating_sub(MAX_INLINE_RULES);
        if hidden > 0 {
            let _ = write!(text, "… and {hidden} more. Use “Full list” to see all.");
        }
    }

    let mut rows: Vec<Vec<Button>> = (1..=data.rules.len().min(MAX_INLINE_RULES))
        .collect::<Vec<_>>()
        .chunks(5)
        .map(|chunk| {
            chunk
                .iter()
                .map(|pos| Button::new(format!("🗑 {pos}"), Callback::PickRule(*pos)))
                .collect()
        })
        .collect();
    rows.push(vec![
        Button::new("➕ Add rule", Callback::AddRule),
        Button::new("📄 Full list", Callback::DumpRules),
    ]);
    rows.push(vec![Button::new("⬅ Back", Callback::Menu)]);
    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::panel::action::MAX_CALLBACK_BYTES;
    use crate::store::RuleAction;

    fn state(view: PanelView) -> PanelState {
        let mut s = PanelState::new(1);
        s.view = view;
        s
    }

    #[test]
    fn main_menu_hides_rules_when_disabled() {
        let rendered = render(&state(PanelView::MainMenu), &ViewData::default());
        let callbacks: Vec<_> = rendered
            .keyboard
            .iter()
            .flatten()
            .map(|b| b.callback.clone())
            .collect();
        assert!(!callbacks.contains(&Callback::Rules));
        assert!(callbacks.contains(&Callback::Export));
    }

    #[test]
    fn notice_appears_above_body() {
        let mut s = state(PanelView::AddUserPrompt);
        s.error("username contains ' '");
        let rendered = render(&s, &ViewData::default());
        assert!(rendered.text.starts_with("Add user\n\n⚠️ username contains ' '\n\n"));
    }

    #[test]
    fn rule_list_numbers_rules() {
        let data = ViewData {
            rules: vec![
                Rule::new(Some("10.3.2.1/32"), None, RuleAction::Allow),
                Rule::new(None, Some("aa"), RuleAction::Deny),
            ],
            rules_enabled: true,
            ..ViewData::default()
        };
        let rendered = render(&state(PanelView::RuleList), &data);
        assert_eq!(
            rendered.text,
            "Access rules\n\n1. 10.3.2.1/32 allow\n2. prefix=aa deny"
        );
        assert_eq!(
            rendered.keyboard[0],
            vec![
                Button::new("🗑 1", Callback::PickRule(1)),
                Button::new("🗑 2", Callback::PickRule(2)),
            ]
        );
    }

    #[test]
    fn long_rule_lists_are_truncated() {
        let data = ViewData {
            rules: (0..25)
                .map(|i| Rule::new(Some(&format!("10.0.{i}.0/24")), None, RuleAction::Deny))
                .collect(),
            rules_enabled: true,
            ..ViewData::default()
        };
        let rendered = render(&state(PanelView::RuleList), &data);
        assert!(rendered.text.contains("… and 5 more"));
        let picks = rendered
            .keyboard
            .iter()
            .flatten()
            .filter(|b| matches!(b.callback, Callback::PickRule(_)))
            .count();
        assert_eq!(picks, MAX_INLINE_RULES);
    }

    #[test]
    fn long_error_notice_keeps_text_within_limit() {
        let mut s = state(PanelView::ExportConfigPrompt);
        s.error(format!("trusttunnel_endpoint failed (exit code 1): {}", "e".repeat(6000)));
        let rendered = render(&s, &ViewData::default());
        assert!(rendered.text.chars().count() <= MAX_TEXT_CHARS);
        assert!(rendered.text.contains('…'));
        assert!(rendered.text.ends_with("Send the username to export configs for."));
    }

    #[test]
    fn oversized_panel_body_is_clipped() {
        let data = ViewData {
            rules: (0..MAX_INLINE_RULES)
                .map(|i| {
                    Rule::new(Some(&format!("10.0.{i}.0/24")), None, RuleAction::Deny)
                        .with_label("x".repeat(300))
                })
                .collect(),
            rules_enabled: true,
            ..ViewData::default()
        };
        let rendered = render(&state(PanelView::RuleList), &data);
        assert_eq!(rendered.text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn long_usernames_get_no_buttons() {
        let long = "a".repeat(60);
        let data = ViewData {
            users: vec!["alice".into(), long.clone()],
            ..ViewData::default()
        };
        let rendered = render(&state(PanelView::UserList), &data);
        assert!(
            rendered
                .keyboard
                .iter()
                .flatten()
                .all(|b| b.callback.data().len() <= MAX_CALLBACK_BYTES)
        );
        assert_eq!(
            rendered.keyboard[0],
            vec![
                Button::new("🗑 alice", Callback::PickUser("alice".into())),
                Button::new("📦 alice", Callback::ExportUser("alice".into())),
            ]
        );
        assert!(!rendered.keyboard.iter().flatten().any(|b| b.label.contains(&long)));
        assert!(rendered.text.contains("1 name(s) are too long for buttons"));
    }

    #[test]
    fn clip_marks_the_cut() {
        assert_eq!(clip("abcdef", 4), "abc…");
        assert_eq!(clip("abc", 4), "abc");
        assert_eq!(clip("ééééé", 3), "éé…");
    }

    #[test]
    fn pending_reconcile_adds_retry_button() {
        let mut s = state(PanelView::MainMenu);
        s.reconcile_pending = true;
        let rendered = render(&s, &ViewData::default());
        assert_eq!(
            rendered.keyboard.last().unwrap(),
            &vec![Button::new("🔄 Retry reconcile", Callback::Reconcile)]
        );
    }
}
