//! Live panel sessions, one per admin conversation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::state::{ConversationId, PanelState};

/// Shared session table. Each state sits behind its own mutex so events
/// for one conversation are applied one at a time while other
/// conversations proceed.
#[derive(Debug, Default)]
pub struct PanelSessions {
    sessions: DashMap<ConversationId, Arc<Mutex<PanelState>>>,
}

impl PanelSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, conversation: ConversationId) -> Arc<Mutex<PanelState>> {
        Arc::clone(
            self.sessions
                .entry(conversation)
                .or_insert_with(|| Arc::new(Mutex::new(PanelState::new(conversation))))
                .value(),
        )
    }

    pub fn get(&self, conversation: ConversationId) -> Option<Arc<Mutex<PanelState>>> {
        self.sessions.get(&conversation).map(|s| Arc::clone(s.value()))
    }

    /// Lock the conversation's live session, creating one if needed. A
    /// state that was ended or evicted while waiting for the lock is
    /// skipped in favour of its successor.
    pub async fn lock(&self, conversation: ConversationId) -> OwnedMutexGuard<PanelState> {
        loop {
            let state = self.get_or_create(conversation).lock_owned().await;
            if !state.closed {
                return state;
            }
        }
    }

    /// Drop a session, returning its last state.
    pub async fn end(&self, conversation: ConversationId) -> Option<PanelState> {
        let (_, state) = self.sessions.remove(&conversation)?;
        let mut state = state.lock().await;
        state.closed = true;
        Some(state.clone())
    }

    /// Remove and return sessions idle for at least `idle`. Sessions busy
    /// handling an event are never idle and are skipped.
    pub async fn take_idle(&self, now: DateTime<Utc>, idle: chrono::Duration) -> Vec<PanelState> {
        let candidates: Vec<ConversationId> = self.sessions.iter().map(|e| *e.key()).collect();

        let mut evicted = Vec::new();
        for id in candidates {
            let removed = self.sessions.remove_if(&id, |_, state| {
                state.try_lock().is_ok_and(|mut s| {
                    let expired = s.is_idle(now, idle);
                    s.closed = expired;
                    expired
                })
            });
            if let Some((_, state)) = removed {
                evicted.push(state.lock().await.clone());
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_conversation_shares_state() {
        let sessions = PanelSessions::new();
        let a = sessions.get_or_create(7);
        let b = sessions.get_or_create(7);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let sessions = PanelSessions::new();
        let old = sessions.get_or_create(1);
        sessions.get_or_create(2);

        let now = Utc::now();
        old.lock().await.last_active = now - chrono::Duration::hours(2);

        let evicted = sessions.take_idle(now, chrono::Duration::hours(1)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].conversation, 1);
        assert!(sessions.get(1).is_none());
        assert!(sessions.get(2).is_some());
    }

    #[tokio::test]
    async fn evicted_state_is_not_handed_out_again() {
        let sessions = PanelSessions::new();
        let held = sessions.get_or_create(1);
        let now = Utc::now();
        held.lock().await.last_active = now - chrono::Duration::hours(2);

        let evicted = sessions.take_idle(now, chrono::Duration::hours(1)).await;
        assert!(evicted[0].closed);
        assert!(held.lock().await.closed);

        let live = sessions.lock(1).await;
        assert!(!live.closed);
        assert_eq!(live.panel, None);
        drop(live);
        assert!(!Arc::ptr_eq(&held, &sessions.get(1).unwrap()));
    }

    #[tokio::test]
    async fn ended_state_is_marked_closed() {
        let sessions = PanelSessions::new();
        let held = sessions.get_or_create(1);
        assert!(sessions.end(1).await.unwrap().closed);
        assert!(held.lock().await.closed);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn busy_sessions_are_kept() {
        let sessions = PanelSessions::new();
        let busy = sessions.get_or_create(1);
        let now = Utc::now();
        let mut guard = busy.lock().await;
        guard.last_active = now - chrono::Duration::hours(2);

        assert!(sessions.take_idle(now, chrono::Duration::hours(1)).await.is_empty());
        drop(guard);
        assert_eq!(sessions.take_idle(now, chrono::Duration::hours(1)).await.len(), 1);
    }
}
