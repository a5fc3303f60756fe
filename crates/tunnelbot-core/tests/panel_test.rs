#![cfg(unix)]
#![allow(clippy::unwrap_used)]

mod common;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::Fixture;
use pretty_assertions::assert_eq;
use tokio::sync::Semaphore;
use tunnelbot_core::CoreError;
use tunnelbot_core::panel::{
    Callback, ChatSurface, ConversationId, ConversationWorkers, EditResult, MAX_TEXT_CHARS,
    MessageHandle, Notice, PanelEvent, PanelMachine, PanelSessions, PanelState, PanelView,
    Rendered,
};
use tunnelbot_core::store::format_summary;

const CHAT: ConversationId = 1001;

#[derive(Debug, Default)]
struct Log {
    next_id: i64,
    /// Panel messages by id, with their current content.
    panels: BTreeMap<i64, Rendered>,
    /// Ids the "user" deleted; edits to them fail.
    deleted: HashSet<i64>,
    aux_texts: Vec<(i64, String)>,
    documents: Vec<(i64, String)>,
    panel_sends: usize,
}

impl Log {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory chat that records what the panel machine does.
#[derive(Debug, Default)]
struct FakeSurface {
    log: Mutex<Log>,
}

impl FakeSurface {
    /// Panel messages still visible in the chat.
    fn live_panels(&self) -> Vec<i64> {
        let log = self.log.lock().unwrap();
        log.panels
            .keys()
            .copied()
            .filter(|id| !log.deleted.contains(id))
            .collect()
    }

    fn panel_text(&self, id: i64) -> String {
        self.log.lock().unwrap().panels[&id].text.clone()
    }

    fn delete(&self, id: i64) {
        self.log.lock().unwrap().deleted.insert(id);
    }

    fn aux_texts(&self) -> Vec<String> {
        let log = self.log.lock().unwrap();
        log.aux_texts.iter().map(|(_, t)| t.clone()).collect()
    }
}

impl ChatSurface for FakeSurface {
    async fn send_panel(&self, _chat: ConversationId, view: &Rendered) -> Result<MessageHandle, CoreError> {
        let mut log = self.log.lock().unwrap();
        let id = log.next();
        log.panels.insert(id, view.clone());
        log.panel_sends += 1;
        Ok(MessageHandle(id))
    }

    async fn edit_panel(
        &self,
        _chat: ConversationId,
        handle: MessageHandle,
        view: &Rendered,
    ) -> Result<EditResult, CoreError> {
        let mut log = self.log.lock().unwrap();
        if log.deleted.contains(&handle.0) {
            return Ok(EditResult::Gone);
        }
        assert!(
            log.panels.contains_key(&handle.0),
            "edited a message that is not a panel"
        );
        log.panels.insert(handle.0, view.clone());
        Ok(EditResult::Edited)
    }

    async fn send_text(&self, _chat: ConversationId, text: &str) -> Result<MessageHandle, CoreError> {
        let mut log = self.log.lock().unwrap();
        let id = log.next();
        log.aux_texts.push((id, text.to_owned()));
        Ok(MessageHandle(id))
    }

    async fn send_document(
        &self,
        _chat: ConversationId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle, CoreError> {
        let mut log = self.log.lock().unwrap();
        let id = log.next();
        assert!(path.exists(), "document {} does not exist", path.display());
        log.documents.push((id, caption.to_owned()));
        Ok(MessageHandle(id))
    }
}

struct Harness {
    fx: Fixture,
    machine: PanelMachine<FakeSurface>,
    state: PanelState,
}

impl Harness {
    fn new() -> Self {
        let fx = Fixture::new();
        let machine = PanelMachine::new(fx.backend(), FakeSurface::default());
        Self {
            fx,
            machine,
            state: PanelState::new(CHAT),
        }
    }

    fn with_config(fx: Fixture, config: tunnelbot_core::ServiceConfig) -> Self {
        let backend = tunnelbot_core::Backend::new(config).unwrap();
        Self {
            fx,
            machine: PanelMachine::new(backend, FakeSurface::default()),
            state: PanelState::new(CHAT),
        }
    }

    /// Send one event and check the one-panel invariant afterwards.
    async fn send(&mut self, event: PanelEvent) {
        self.machine.handle(&mut self.state, event).await.unwrap();
        let live = self.machine.surface().live_panels();
        assert_eq!(live.len(), 1, "expected exactly one live panel, got {live:?}");
        assert_eq!(self.state.panel, Some(MessageHandle(live[0])));
    }

    async fn press(&mut self, callback: Callback) {
        self.send(PanelEvent::Callback(callback)).await;
    }

    async fn type_text(&mut self, text: &str) {
        self.send(PanelEvent::Text(text.into())).await;
    }

    fn panel_text(&self) -> String {
        let handle = self.state.panel.unwrap();
        self.machine.surface().panel_text(handle.0)
    }
}

#[tokio::test]
async fn navigation_reuses_one_panel() {
    let mut h = Harness::new();
    h.send(PanelEvent::Start).await;
    h.press(Callback::Users).await;
    h.press(Callback::AddUser).await;
    h.send(PanelEvent::Cancel).await;

    assert_eq!(h.state.view, PanelView::MainMenu);
    assert_eq!(h.machine.surface().log.lock().unwrap().panel_sends, 1);
}

#[tokio::test]
async fn add_user_sends_credentials_separately() {
    let mut h = Harness::new();
    h.send(PanelEvent::Start).await;
    h.press(Callback::AddUser).await;
    h.type_text("alice p1").await;

    assert_eq!(h.state.view, PanelView::UserList);
    assert_eq!(
        h.state.notice,
        Some(Notice::Info(
            "User alice added. Endpoint service restarted.".into()
        ))
    );
    assert!(h.panel_text().contains("1 user(s)"));
    assert_eq!(
        h.machine.surface().aux_texts(),
        ["New VPN account\nUsername: alice\nPassword: p1"]
    );

    let aux_ids: Vec<i64> = {
        let log = h.machine.surface().log.lock().unwrap();
        log.aux_texts.iter().map(|(id, _)| *id).collect()
    };
    assert!(!aux_ids.contains(&h.state.panel.unwrap().0));
    assert_eq!(h.fx.restart_count(), 1);
}

#[tokio::test]
async fn generated_password_when_omitted() {
    let mut h = Harness::new();
    h.press(Callback::AddUser).await;
    h.type_text("@bob").await;

    let texts = h.machine.surface().aux_texts();
    let password = texts[0].rsplit("Password: ").next().unwrap();
    assert_eq!(password.len(), 16);
    assert_eq!(
        h.machine.backend().credentials().list_users().await.unwrap(),
        ["bob"]
    );
}

#[tokio::test]
async fn invalid_input_stays_in_prompt() {
    let mut h = Harness::new();
    h.press(Callback::AddUser).await;
    h.type_text("no way jose").await;
    assert_eq!(h.state.view, PanelView::AddUserPrompt);
    assert!(matches!(h.state.notice, Some(Notice::Error(_))));

    h.type_text(".hidden").await;
    assert_eq!(h.state.view, PanelView::AddUserPrompt);
    assert!(h.panel_text().contains("⚠️ Validation failed"));
    assert!(!h.fx.credentials_path().exists());
}

#[tokio::test]
async fn duplicate_user_is_annotated() {
    let mut h = Harness::new();
    h.press(Callback::AddUser).await;
    h.type_text("alice p1").await;
    h.press(Callback::AddUser).await;
    h.type_text("alice p2").await;

    assert_eq!(h.state.view, PanelView::AddUserPrompt);
    assert_eq!(
        h.state.notice,
        Some(Notice::Error("User 'alice' already exists".into()))
    );
}

#[tokio::test]
async fn forwarded_message_adds_sender() {
    let mut h = Harness::new();
    h.press(Callback::AddUser).await;
    h.send(PanelEvent::Forwarded {
        username: None,
        user_id: Some(42),
    })
    .await;
    h.press(Callback::AddUser).await;
    h.send(PanelEvent::Forwarded {
        username: Some("carol_w".into()),
        user_id: Some(43),
    })
    .await;

    assert_eq!(
        h.machine.backend().credentials().list_users().await.unwrap(),
        ["user_42", "carol_w"]
    );
}

#[tokio::test]
async fn hidden_forward_is_rejected() {
    let mut h = Harness::new();
    h.press(Callback::AddUser).await;
    h.send(PanelEvent::Forwarded {
        username: None,
        user_id: None,
    })
    .await;
    assert_eq!(h.state.view, PanelView::AddUserPrompt);
    assert!(matches!(h.state.notice, Some(Notice::Error(_))));
}

#[tokio::test]
async fn delete_user_flow() {
    let mut h = Harness::new();
    h.press(Callback::AddUser).await;
    h.type_text("alice p1").await;

    h.press(Callback::PickUser("alice".into())).await;
    assert_eq!(h.state.view, PanelView::DeleteUserConfirm);
    assert!(h.panel_text().contains("Delete user alice?"));

    h.press(Callback::ConfirmDeleteUser).await;
    assert_eq!(h.state.view, PanelView::UserList);
    assert!(h.panel_text().contains("No users yet."));
    assert!(
        h.machine
            .backend()
            .credentials()
            .list_users()
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn stale_confirm_button_expires() {
    let mut h = Harness::new();
    h.send(PanelEvent::Start).await;
    h.press(Callback::ConfirmDeleteUser).await;
    assert_eq!(h.state.view, PanelView::MainMenu);
    assert!(h.panel_text().contains("expired"));
}

#[tokio::test]
async fn deleted_panel_is_replaced() {
    let mut h = Harness::new();
    h.send(PanelEvent::Start).await;
    let first = h.state.panel.unwrap();

    h.machine.surface().delete(first.0);
    h.press(Callback::Users).await;

    let second = h.state.panel.unwrap();
    assert_ne!(first, second);
    assert_eq!(h.machine.surface().live_panels(), [second.0]);
}

#[tokio::test]
async fn rule_flow_and_dump() {
    let mut h = Harness::new();
    h.press(Callback::Rules).await;
    assert!(h.panel_text().contains("No rules."));

    h.press(Callback::AddRule).await;
    h.type_text("10.3.2.1/32 allow").await;
    assert_eq!(h.state.view, PanelView::RuleList);
    assert!(h.panel_text().contains("1. 10.3.2.1/32 allow"));

    h.press(Callback::AddRule).await;
    h.type_text("10.3.2.1/99 allow").await;
    assert_eq!(h.state.view, PanelView::AddRulePrompt);
    assert!(matches!(h.state.notice, Some(Notice::Error(_))));

    h.press(Callback::DumpRules).await;
    assert_eq!(h.machine.surface().aux_texts(), ["1. 10.3.2.1/32 allow"]);

    h.press(Callback::PickRule(1)).await;
    assert!(h.panel_text().contains("10.3.2.1/32 allow"));
    h.press(Callback::ConfirmDeleteRule).await;
    assert!(h.panel_text().contains("No rules."));
}

#[tokio::test]
async fn rules_menu_without_rules_file() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.stores.rules = None;
    let mut h = Harness::with_config(fx, config);

    h.press(Callback::Rules).await;
    assert_eq!(h.state.view, PanelView::MainMenu);
    assert!(h.panel_text().contains("rule management is disabled"));
}

#[tokio::test]
async fn failed_reconcile_offers_retry() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.reconcile.restart_command = vec!["false".into()];
    let mut h = Harness::with_config(fx, config);

    h.press(Callback::AddUser).await;
    h.type_text("alice p1").await;

    assert!(h.state.reconcile_pending);
    assert!(h.panel_text().contains("has not picked it up yet"));
    let log = h.machine.surface().log.lock().unwrap();
    let panel = &log.panels[&h.state.panel.unwrap().0];
    assert!(
        panel
            .keyboard
            .iter()
            .flatten()
            .any(|b| b.callback == Callback::Reconcile)
    );
}

#[tokio::test]
async fn export_sends_three_auxiliary_messages() {
    let fx = Fixture::new();
    let endpoint = fx.script(
        "fake_endpoint",
        "cat <<EOT\nhostname = \"vpn.example.com\"\naddresses = [\"203.0.113.7:443\"]\n\
         username = \"$4\"\npassword = \"pw\"\nprotocol = \"http2\"\nEOT",
    );
    let mut config = fx.config();
    config.endpoint.endpoint_binary = endpoint;
    config.endpoint.client_binary = fx.dir.path().join("missing_client");
    config.endpoint.vpn_config = Some("vpn.toml".into());
    config.endpoint.hosts_config = Some("hosts.toml".into());
    config.endpoint.public_address = Some("vpn.example.com".into());
    let mut h = Harness::with_config(fx, config);

    h.press(Callback::AddUser).await;
    h.type_text("alice p1").await;
    h.press(Callback::Export).await;
    h.type_text("ghost").await;
    assert_eq!(h.state.view, PanelView::ExportConfigPrompt);
    assert!(h.panel_text().contains("User 'ghost' not found"));

    h.type_text("alice").await;
    assert_eq!(h.state.view, PanelView::MainMenu);

    let log = h.machine.surface().log.lock().unwrap();
    assert_eq!(log.documents.len(), 2);
    assert_eq!(log.documents[0].1, "Endpoint config for alice");
    assert!(log.documents[1].1.contains("template"));
    assert!(log.aux_texts.last().unwrap().1.starts_with("Connection details"));
}

#[tokio::test]
async fn end_closes_the_panel() {
    let mut h = Harness::new();
    h.send(PanelEvent::Start).await;
    let handle = h.state.panel.unwrap();

    h.machine
        .handle(&mut h.state, PanelEvent::End)
        .await
        .unwrap();

    assert_eq!(h.state.panel, None);
    let text = h.machine.surface().panel_text(handle.0);
    assert!(text.starts_with("Session closed"));
    let log = h.machine.surface().log.lock().unwrap();
    assert!(log.panels[&handle.0].keyboard.is_empty());
}

#[tokio::test]
async fn rule_delete_refuses_a_rule_that_moved() {
    let mut h = Harness::new();
    for rule in ["10.0.0.0/8 allow", "10.1.0.0/16 deny", "10.2.0.0/16 allow"] {
        h.press(Callback::AddRule).await;
        h.type_text(rule).await;
    }
    h.press(Callback::PickRule(2)).await;
    assert!(h.panel_text().contains("Delete rule #2?\n10.1.0.0/16 deny"));

    // A second admin removes rule #1 meanwhile.
    let other = PanelMachine::new(h.fx.backend(), FakeSurface::default());
    let mut other_state = PanelState::new(CHAT + 1);
    for callback in [Callback::PickRule(1), Callback::ConfirmDeleteRule] {
        other
            .handle(&mut other_state, PanelEvent::Callback(callback))
            .await
            .unwrap();
    }

    h.press(Callback::ConfirmDeleteRule).await;
    assert_eq!(h.state.view, PanelView::RuleList);
    assert!(matches!(&h.state.notice, Some(Notice::Error(msg)) if msg.contains("changed")));

    let left = h.machine.backend().rules().unwrap().list_rules().await.unwrap();
    assert_eq!(
        format_summary(&left).collect::<Vec<_>>(),
        ["10.1.0.0/16 deny", "10.2.0.0/16 allow"]
    );
}

#[tokio::test]
async fn picking_a_missing_rule_stays_in_list() {
    let mut h = Harness::new();
    h.press(Callback::PickRule(4)).await;
    assert_eq!(h.state.view, PanelView::RuleList);
    assert!(h.panel_text().contains("Rule #4 no longer exists."));
}

#[tokio::test]
async fn huge_tool_stderr_still_fits_the_panel() {
    let fx = Fixture::new();
    let endpoint = fx.script("noisy_endpoint", "head -c 6000 /dev/zero | tr '\\0' e >&2\nexit 1");
    let mut config = fx.config();
    config.endpoint.endpoint_binary = endpoint;
    config.endpoint.vpn_config = Some("vpn.toml".into());
    config.endpoint.hosts_config = Some("hosts.toml".into());
    config.endpoint.public_address = Some("vpn.example.com".into());
    let mut h = Harness::with_config(fx, config);

    h.press(Callback::AddUser).await;
    h.type_text("alice p1").await;
    h.press(Callback::Export).await;
    h.type_text("alice").await;

    assert_eq!(h.state.view, PanelView::ExportConfigPrompt);
    let text = h.panel_text();
    assert!(text.contains("failed (exit code 1)"));
    assert!(text.chars().count() <= MAX_TEXT_CHARS, "{} chars", text.chars().count());
}

#[tokio::test]
async fn closed_state_is_never_redrawn() {
    let mut h = Harness::new();
    h.send(PanelEvent::Start).await;
    h.state.closed = true;

    h.machine
        .handle(&mut h.state, PanelEvent::Callback(Callback::Users))
        .await
        .unwrap();

    assert_eq!(h.state.view, PanelView::MainMenu);
    assert!(h.panel_text().contains("Choose an action."));
    assert_eq!(h.machine.surface().log.lock().unwrap().panel_sends, 1);
}

// ── Conversation workers ────────────────────────────────────────────

fn workers_for(fx: &Fixture) -> (Arc<PanelMachine<FakeSurface>>, Arc<PanelSessions>, ConversationWorkers<FakeSurface>) {
    let machine = Arc::new(PanelMachine::new(fx.backend(), FakeSurface::default()));
    let sessions = Arc::new(PanelSessions::new());
    let workers =
        ConversationWorkers::new(Arc::clone(&machine), Arc::clone(&sessions), Duration::from_secs(60));
    (machine, sessions, workers)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn queued_events_run_in_order_per_conversation() {
    let fx = Fixture::new();
    let (machine, sessions, mut workers) = workers_for(&fx);

    for event in [
        PanelEvent::Start,
        PanelEvent::Callback(Callback::AddUser),
        PanelEvent::Text("alice p1".into()),
        PanelEvent::Callback(Callback::AddUser),
        PanelEvent::Text("bob p2".into()),
    ] {
        workers.enqueue(CHAT, event);
    }
    workers.enqueue(CHAT + 1, PanelEvent::Start);
    workers.shutdown(Duration::from_secs(30)).await;

    assert_eq!(
        machine.backend().credentials().list_users().await.unwrap(),
        ["alice", "bob"]
    );
    let state = sessions.get(CHAT).unwrap();
    assert_eq!(state.lock().await.view, PanelView::UserList);
    assert_eq!(sessions.len(), 2);
    assert_eq!(machine.surface().live_panels().len(), 2);
}

#[tokio::test]
async fn stop_ends_session_and_retires_worker() {
    let fx = Fixture::new();
    let (machine, sessions, mut workers) = workers_for(&fx);

    workers.enqueue(CHAT, PanelEvent::Start);
    workers.enqueue(CHAT, PanelEvent::End);
    wait_until(|| workers.active() == 0).await;

    assert!(sessions.get(CHAT).is_none());
    let closed = machine.surface().live_panels()[0];
    assert!(machine.surface().panel_text(closed).starts_with("Session closed"));

    workers.enqueue(CHAT, PanelEvent::Start);
    workers.shutdown(Duration::from_secs(10)).await;
    assert!(sessions.get(CHAT).is_some());
    assert_eq!(machine.surface().log.lock().unwrap().panel_sends, 2);
}

#[tokio::test]
async fn idle_worker_exits_without_losing_the_session() {
    let fx = Fixture::new();
    let machine = Arc::new(PanelMachine::new(fx.backend(), FakeSurface::default()));
    let sessions = Arc::new(PanelSessions::new());
    let mut workers =
        ConversationWorkers::new(Arc::clone(&machine), Arc::clone(&sessions), Duration::from_millis(50));

    workers.enqueue(CHAT, PanelEvent::Start);
    wait_until(|| workers.active() == 0).await;
    assert!(sessions.get(CHAT).is_some());

    workers.enqueue(CHAT, PanelEvent::Callback(Callback::Users));
    workers.shutdown(Duration::from_secs(10)).await;
    assert_eq!(machine.surface().log.lock().unwrap().panel_sends, 1);
    assert_eq!(sessions.get(CHAT).unwrap().lock().await.view, PanelView::UserList);
}

/// Holds back panel sends for one chat until released.
struct GatedSurface {
    inner: FakeSurface,
    gated: ConversationId,
    gate: Semaphore,
}

impl ChatSurface for GatedSurface {
    async fn send_panel(&self, chat: ConversationId, view: &Rendered) -> Result<MessageHandle, CoreError> {
        if chat == self.gated {
            let _permit = self.gate.acquire().await.unwrap();
        }
        self.inner.send_panel(chat, view).await
    }

    async fn edit_panel(
        &self,
        chat: ConversationId,
        handle: MessageHandle,
        view: &Rendered,
    ) -> Result<EditResult, CoreError> {
        self.inner.edit_panel(chat, handle, view).await
    }

    async fn send_text(&self, chat: ConversationId, text: &str) -> Result<MessageHandle, CoreError> {
        self.inner.send_text(chat, text).await
    }

    async fn send_document(
        &self,
        chat: ConversationId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle, CoreError> {
        self.inner.send_document(chat, path, caption).await
    }
}

#[tokio::test]
async fn slow_conversation_does_not_block_others() {
    let fx = Fixture::new();
    let surface = GatedSurface {
        inner: FakeSurface::default(),
        gated: CHAT,
        gate: Semaphore::new(0),
    };
    let machine = Arc::new(PanelMachine::new(fx.backend(), surface));
    let sessions = Arc::new(PanelSessions::new());
    let mut workers =
        ConversationWorkers::new(Arc::clone(&machine), Arc::clone(&sessions), Duration::from_secs(60));

    workers.enqueue(CHAT, PanelEvent::Start);
    workers.enqueue(CHAT + 1, PanelEvent::Start);
    wait_until(|| machine.surface().inner.live_panels().len() == 1).await;

    let blocked = sessions.get(CHAT).unwrap();
    assert!(blocked.try_lock().is_err(), "first conversation should still be busy");

    machine.surface().gate.add_permits(1);
    workers.shutdown(Duration::from_secs(10)).await;
    assert_eq!(machine.surface().inner.live_panels().len(), 2);
    assert!(blocked.lock().await.panel.is_some());
}
