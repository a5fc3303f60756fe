//! One ordered event queue per conversation.
//!
//! Events for a conversation run strictly in arrival order on that
//! conversation's worker; different conversations run concurrently. A
//! worker retires after its session ends or after sitting idle, but only
//! while nothing is queued for it, so no event is lost or overtaken.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::action::PanelEvent;
use super::machine::PanelMachine;
use super::sessions::PanelSessions;
use super::state::ConversationId;
use super::surface::ChatSurface;

type Queues = DashMap<ConversationId, mpsc::UnboundedSender<PanelEvent>>;

pub struct ConversationWorkers<S> {
    machine: Arc<PanelMachine<S>>,
    sessions: Arc<PanelSessions>,
    queues: Arc<Queues>,
    workers: JoinSet<()>,
    linger: Duration,
}

impl<S: ChatSurface + 'static> ConversationWorkers<S> {
    /// `linger` is how long an idle worker waits for more events.
    pub fn new(machine: Arc<PanelMachine<S>>, sessions: Arc<PanelSessions>, linger: Duration) -> Self {
        Self {
            machine,
            sessions,
            queues: Arc::new(DashMap::new()),
            workers: JoinSet::new(),
            linger,
        }
    }

    pub fn machine(&self) -> &PanelMachine<S> {
        &self.machine
    }

    /// Conversations with a running worker.
    pub fn active(&self) -> usize {
        self.queues.len()
    }

    /// Queue an event behind earlier ones for the same conversation.
    pub fn enqueue(&mut self, chat: ConversationId, event: PanelEvent) {
        while self.workers.try_join_next().is_some() {}

        let Err(event) = self.send(chat, event) else {
            return;
        };
        // The worker died without retiring its queue.
        self.queues.remove(&chat);
        if self.send(chat, event).is_err() {
            warn!(conversation = chat, "panel worker gone, event dropped");
        }
    }

    fn send(&mut self, chat: ConversationId, event: PanelEvent) -> Result<(), PanelEvent> {
        let queue = self.queues.entry(chat).or_insert_with(|| {
            spawn_worker(
                &mut self.workers,
                Arc::clone(&self.machine),
                Arc::clone(&self.sessions),
                Arc::clone(&self.queues),
                chat,
                self.linger,
            )
        });
        queue.send(event).map_err(|e| e.0)
    }

    /// Close every queue and wait up to `drain` for queued events to finish.
    pub async fn shutdown(mut self, drain: Duration) {
        self.queues.clear();
        let drained = tokio::time::timeout(drain, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("panel workers still busy at shutdown, aborting");
            self.workers.abort_all();
        }
    }
}

fn spawn_worker<S: ChatSurface + 'static>(
    workers: &mut JoinSet<()>,
    machine: Arc<PanelMachine<S>>,
    sessions: Arc<PanelSessions>,
    queues: Arc<Queues>,
    chat: ConversationId,
    linger: Duration,
) -> mpsc::UnboundedSender<PanelEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PanelEvent>();
    workers.spawn(async move {
        loop {
            let event = match tokio::time::timeout(linger, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) if retire(&queues, chat, &rx) => break,
                Err(_) => continue,
            };

            let ending = matches!(event, PanelEvent::End);
            let mut state = sessions.lock(chat).await;
            if let Err(e) = machine.handle(&mut state, event).await {
                warn!(conversation = chat, error = %e, "panel update failed");
            }
            drop(state);

            if ending {
                sessions.end(chat).await;
                debug!(conversation = chat, "session ended");
                if retire(&queues, chat, &rx) {
                    break;
                }
            }
        }
        debug!(conversation = chat, "panel worker stopped");
    });
    tx
}

/// Drop the conversation's queue if nothing is waiting in it. Runs under
/// the map's shard lock, so no event can slip in between check and removal.
fn retire(queues: &Queues, chat: ConversationId, rx: &mpsc::UnboundedReceiver<PanelEvent>) -> bool {
    queues.remove_if(&chat, |_, _| rx.is_empty()).is_some()
}
