//! Panel transitions: apply an event to the backend, then redraw the one
//! panel message.
//!
//! Backend failures never escape `handle`; they become a notice on the
//! panel and the view stays where the admin can retry. Only failures of
//! the chat surface itself are returned.

use tracing::{debug, warn};

use super::action::{Callback, PanelEvent};
use super::render::{Rendered, ViewData, clip, render};
use super::state::{PanelState, Target};
use super::surface::{ChatSurface, EditResult};
use super::view::PanelView;
use crate::backend::Backend;
use crate::error::CoreError;
use crate::export::format_profile;
use crate::reconcile::ReconcileOutcome;
use crate::store::{
    RuleMatcher, RuleRegistry, format_summary, generate_password, normalize_username, parse_rule,
    validate_username,
};

/// Longest auxiliary text sent in one message.
const MAX_MESSAGE_CHARS: usize = 4000;

const CLOSED_TEXT: &str = "Session closed. Send /start to open a new panel.";

pub struct PanelMachine<S> {
    backend: Backend,
    surface: S,
}

impl<S: ChatSurface> PanelMachine<S> {
    pub fn new(backend: Backend, surface: S) -> Self {
        Self { backend, surface }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Apply one event and bring the panel message up to date.
    pub async fn handle(&self, state: &mut PanelState, event: PanelEvent) -> Result<(), CoreError> {
        if state.closed {
            debug!(conversation = state.conversation, "event for a closed session dropped");
            return Ok(());
        }
        state.touch();
        state.notice = None;
        debug!(
            conversation = state.conversation,
            view = %state.view,
            event = event.kind(),
            "panel event"
        );

        match event {
            PanelEvent::End => return self.close(state).await,
            PanelEvent::Start | PanelEvent::Menu | PanelEvent::Cancel => {
                state.go(PanelView::MainMenu);
            }
            PanelEvent::Callback(callback) => self.on_callback(state, callback).await,
            PanelEvent::Text(text) => self.on_text(state, &text).await,
            PanelEvent::Forwarded { username, user_id } => {
                self.on_forward(state, username.as_deref(), user_id).await;
            }
        }

        self.show(state).await
    }

    /// Render the current state onto the panel message.
    pub async fn show(&self, state: &mut PanelState) -> Result<(), CoreError> {
        let data = self.view_data(state).await;
        let rendered = render(state, &data);
        self.upsert(state, &rendered).await
    }

    /// Strip the panel of its buttons and forget it.
    pub async fn close(&self, state: &mut PanelState) -> Result<(), CoreError> {
        if let Some(handle) = state.panel.take() {
            let closed = Rendered {
                text: CLOSED_TEXT.into(),
                keyboard: Vec::new(),
            };
            self.surface
                .edit_panel(state.conversation, handle, &closed)
                .await?;
        }
        Ok(())
    }

    // ── Transitions ─────────────────────────────────────────────────

    async fn on_callback(&self, state: &mut PanelState, callback: Callback) {
        match callback {
            Callback::Menu => state.go(PanelView::MainMenu),
            Callback::Users => state.go(PanelView::UserList),
            Callback::AddUser => state.go(PanelView::AddUserPrompt),
            Callback::PickUser(name) => {
                state.go(PanelView::DeleteUserConfirm);
                state.target = Some(Target::User(name));
            }
            Callback::ConfirmDeleteUser => self.confirm_delete_user(state).await,
            Callback::ExportUser(name) => {
                state.go(PanelView::UserList);
                self.export(state, &name).await;
            }
            Callback::Rules => {
                if self.rules(state).is_some() {
                    state.go(PanelView::RuleList);
                }
            }
            Callback::AddRule => {
                if self.rules(state).is_some() {
                    state.go(PanelView::AddRulePrompt);
                }
            }
            Callback::PickRule(position) => self.pick_rule(state, position).await,
            Callback::ConfirmDeleteRule => self.confirm_delete_rule(state).await,
            Callback::DumpRules => self.dump_rules(state).await,
            Callback::Export => state.go(PanelView::ExportConfigPrompt),
            Callback::Reconcile => {
                let outcome = self.backend.reconciler().reconcile().await;
                report(state, "Reconciliation finished", &outcome);
            }
        }
    }

    async fn on_text(&self, state: &mut PanelState, text: &str) {
        match state.view {
            PanelView::AddUserPrompt => {
                let mut parts = text.split_whitespace();
                let (Some(name), password, None) = (parts.next(), parts.next(), parts.next()) else {
                    state.error("Send '<username>' or '<username> <password>'.");
                    return;
                };
                self.add_user(state, &normalize_username(name), password.map(str::to_owned))
                    .await;
            }
            PanelView::AddRulePrompt => {
                let Some(rules) = self.rules(state) else {
                    return;
                };
                let change = match parse_rule(text) {
                    Ok(rule) => rules.append_rule(rule).await,
                    Err(e) => Err(e),
                };
                match change {
                    Ok(change) => {
                        state.go(PanelView::RuleList);
                        report(state, &format!("Rule added: {}", change.rule), &change.outcome);
                    }
                    Err(e) => state.error(e.to_string()),
                }
            }
            PanelView::ExportConfigPrompt => {
                let username = normalize_username(text);
                if let Err(e) = validate_username(&username) {
                    state.error(e.to_string());
                    return;
                }
                if self.export(state, &username).await {
                    state.view = PanelView::MainMenu;
                }
            }
            _ => state.info("Use the buttons below."),
        }
    }

    async fn on_forward(&self, state: &mut PanelState, username: Option<&str>, user_id: Option<i64>) {
        if state.view != PanelView::AddUserPrompt {
            state.info("Forwarded messages are only used when adding a user.");
            return;
        }

        let handle = username
            .map(normalize_username)
            .filter(|name| validate_username(name).is_ok());
        let Some(name) = handle.or_else(|| user_id.map(|id| format!("user_{id}"))) else {
            state.error("The sender hides their account. Send a username instead.");
            return;
        };
        self.add_user(state, &name, None).await;
    }

    async fn add_user(&self, state: &mut PanelState, username: &str, password: Option<String>) {
        let password = password.unwrap_or_else(generate_password);
        match self.backend.credentials().add_user(username, &password).await {
            Ok(change) => {
                state.go(PanelView::UserList);
                report(state, &format!("User {username} added"), &change.outcome);
                let credentials =
                    format!("New VPN account\nUsername: {username}\nPassword: {password}");
                self.aux_text(state, &credentials).await;
            }
            Err(e) => state.error(e.to_string()),
        }
    }

    async fn confirm_delete_user(&self, state: &mut PanelState) {
        let (PanelView::DeleteUserConfirm, Some(Target::User(name))) =
            (state.view, state.target.clone())
        else {
            expired(state);
            return;
        };

        state.go(PanelView::UserList);
        match self.backend.credentials().delete_user(&name).await {
            Ok(change) => report(state, &format!("User {name} deleted"), &change.outcome),
            Err(e) => state.error(e.to_string()),
        }
    }

    async fn pick_rule(&self, state: &mut PanelState, position: usize) {
        let Some(rules) = self.rules(state) else {
            return;
        };
        state.go(PanelView::RuleList);
        let picked = match rules.list_rules().await {
            Ok(list) => position.checked_sub(1).and_then(|idx| list.get(idx).cloned()),
            Err(e) => {
                state.error(e.to_string());
                return;
            }
        };
        match picked {
            Some(rule) => {
                state.go(PanelView::DeleteRuleConfirm);
                state.target = Some(Target::Rule { position, rule });
            }
            None => state.error(format!("Rule #{position} no longer exists.")),
        }
    }

    async fn confirm_delete_rule(&self, state: &mut PanelState) {
        let (PanelView::DeleteRuleConfirm, Some(Target::Rule { position, rule })) =
            (state.view, state.target.clone())
        else {
            expired(state);
            return;
        };
        let Some(rules) = self.rules(state) else {
            return;
        };

        state.go(PanelView::RuleList);
        match rules.remove_rule(&RuleMatcher::Exact { position, rule }).await {
            Ok(change) => report(state, &format!("Rule removed: {}", change.rule), &change.outcome),
            Err(CoreError::RuleNotFound { .. }) => state.error(format!(
                "Rule #{position} changed since it was picked. Nothing was removed."
            )),
            Err(e) => state.error(e.to_string()),
        }
    }

    async fn dump_rules(&self, state: &mut PanelState) {
        let Some(rules) = self.rules(state) else {
            return;
        };
        state.go(PanelView::RuleList);

        let list = match rules.list_rules().await {
            Ok(list) => list,
            Err(e) => {
                state.error(e.to_string());
                return;
            }
        };
        if list.is_empty() {
            state.info("No rules to send.");
            return;
        }

        let lines: Vec<String> = format_summary(&list)
            .enumerate()
            .map(|(idx, line)| clip(&format!("{}. {line}", idx + 1), MAX_MESSAGE_CHARS))
            .collect();
        for chunk in chunk_lines(&lines, MAX_MESSAGE_CHARS) {
            if !self.aux_text(state, &chunk).await {
                return;
            }
        }
        state.info(format!("Sent all {} rule(s) below.", list.len()));
    }

    /// Run a full export and send the results. Returns whether it worked.
    async fn export(&self, state: &mut PanelState, username: &str) -> bool {
        let bundle = match self.backend.exporter().export(username).await {
            Ok(bundle) => bundle,
            Err(e) => {
                state.error(e.to_string());
                return false;
            }
        };

        let chat = state.conversation;
        let client_caption = if bundle.client.skip_verification {
            format!(
                "Client config for {username} ({}, certificate verification disabled)",
                bundle.client.variant
            )
        } else {
            format!("Client config for {username} ({})", bundle.client.variant)
        };
        let sent = async {
            self.surface
                .send_document(chat, &bundle.endpoint.path, &format!("Endpoint config for {username}"))
                .await?;
            self.surface
                .send_document(chat, &bundle.client.path, &client_caption)
                .await?;
            self.surface
                .send_text(chat, &format_profile(&bundle.profile))
                .await
        }
        .await;

        match sent {
            Ok(_) => {
                state.info(format!("Configs for {username} sent below."));
                true
            }
            Err(e) => {
                warn!(error = %e, username, "failed to deliver exported configs");
                state.error(format!("Configs were generated but could not be sent: {e}"));
                false
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn rules(&self, state: &mut PanelState) -> Option<&RuleRegistry> {
        match self.backend.rules() {
            Ok(rules) => Some(rules),
            Err(e) => {
                state.go(PanelView::MainMenu);
                state.error(e.to_string());
                None
            }
        }
    }

    /// Send an auxiliary message. A failure turns into an error notice.
    async fn aux_text(&self, state: &mut PanelState, text: &str) -> bool {
        match self.surface.send_text(state.conversation, text).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "failed to send auxiliary message");
                state.error(format!("Could not send a message: {e}"));
                false
            }
        }
    }

    async fn view_data(&self, state: &mut PanelState) -> ViewData {
        let mut data = ViewData {
            rules_enabled: self.backend.rules_enabled(),
            ..ViewData::default()
        };

        let loaded = match state.view {
            PanelView::UserList => self
                .backend
                .credentials()
                .list_users()
                .await
                .map(|users| data.users = users),
            PanelView::RuleList => match self.backend.rules() {
                Ok(rules) => rules.list_rules().await.map(|rules| data.rules = rules),
                Err(e) => Err(e),
            },
            _ => Ok(()),
        };
        if let Err(e) = loaded {
            state.error(e.to_string());
        }
        data
    }

    /// Edit the panel in place; send a fresh one only if there is none or
    /// the old one is gone.
    async fn upsert(&self, state: &mut PanelState, rendered: &Rendered) -> Result<(), CoreError> {
        if let Some(handle) = state.panel {
            match self
                .surface
                .edit_panel(state.conversation, handle, rendered)
                .await?
            {
                EditResult::Edited => return Ok(()),
                EditResult::Gone => {
                    debug!(conversation = state.conversation, "panel message gone, sending a new one");
                }
            }
        }

        let handle = self.surface.send_panel(state.conversation, rendered).await?;
        state.panel = Some(handle);
        Ok(())
    }
}

fn expired(state: &mut PanelState) {
    state.go(PanelView::MainMenu);
    state.error("That button has expired. Start again from the menu.");
}

/// Turn a committed change's reconcile outcome into the panel notice.
fn report(state: &mut PanelState, subject: &str, outcome: &ReconcileOutcome) {
    state.reconcile_pending = outcome.is_failed();
    match outcome {
        ReconcileOutcome::ReloadedLive => state.info(format!("{subject}. Endpoint reloaded live.")),
        ReconcileOutcome::Restarted => state.info(format!("{subject}. Endpoint service restarted.")),
        ReconcileOutcome::Failed { reason } => state.error(format!(
            "{subject}, but the endpoint has not picked it up yet: {reason}"
        )),
    }
}

/// Group lines into newline-joined chunks of at most `limit` characters.
fn chunk_lines(lines: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && current.chars().count() + 1 + line.chars().count() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
