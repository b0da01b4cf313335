// src/services/registry.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::services::lesson::LessonSession;

pub type SharedSession = Arc<Mutex<LessonSession>>;

/// Live lesson sessions by id. Holding a session's mutex serializes every
/// request on it.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: LessonSession) -> SharedSession {
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, shared.clone());
        shared
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Abandons and drops every session idle for at least `ttl`. Sessions busy
    /// with a request are left alone. Returns how many were reaped.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let snapshot: Vec<(Uuid, SharedSession)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();

        let mut reaped = 0;
        for (id, shared) in snapshot {
            let Ok(mut session) = shared.try_lock() else {
                continue;
            };
            if session.idle_for() < ttl {
                continue;
            }
            let outcome = session.abandon();
            tracing::info!(
                "Reaped idle session {} of {} (lost {} points)",
                id,
                session.user_id(),
                outcome.lost_points
            );
            drop(session);
            self.sessions.write().await.remove(&id);
            reaped += 1;
        }
        reaped
    }
}

/// Aborts the reaper task when dropped.
pub struct ReaperHandle(JoinHandle<()>);

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Periodically reaps sessions idle for longer than `ttl`.
pub fn spawn_reaper(registry: Arc<SessionRegistry>, ttl: Duration, every: Duration) -> ReaperHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle(ttl).await;
            if reaped > 0 {
                tracing::debug!("Session reaper removed {} sessions", reaped);
            }
        }
    });
    ReaperHandle(task)
}
