//! Registry of live watch sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::queue::EventQueue;
use crate::selector::SessionKey;

/// Identifies one registration, distinguishing sessions that share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

#[derive(Debug)]
struct Entry {
    id: SessionId,
    queue: EventQueue,
    started: Instant,
}

/// Point-in-time view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The session's key
    pub key: SessionKey,
    /// Events waiting in the session's queue
    pub queue_depth: usize,
    /// Time since the session was registered
    pub age: Duration,
}

/// Maps session keys to their queues.
///
/// The lock is held for map access only. Registering a key that is already
/// present replaces the older entry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionKey, Entry>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        // Map updates are single inserts/removes, so a poisoned map is still
        // consistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `queue` under `key`, returning the new registration's id.
    pub fn register(&self, key: SessionKey, queue: EventQueue) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Entry {
            id,
            queue,
            started: Instant::now(),
        };
        let replaced = self.lock().insert(key.clone(), entry);
        if replaced.is_some() {
            tracing::warn!("Session {} replaced an existing session with the same key", key);
        }
        id
    }

    /// Remove the entry for `key` if it still belongs to registration `id`.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, key: &SessionKey, id: SessionId) -> bool {
        let mut sessions = self.lock();
        match sessions.get(key) {
            Some(entry) if entry.id == id => {
                sessions.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Whether a session is registered under `key`.
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot all sessions, sorted by key.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let now = Instant::now();
        let entries: Vec<(SessionKey, EventQueue, Instant)> = self
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.queue.clone(), entry.started))
            .collect();
        let mut sessions: Vec<SessionSnapshot> = entries
            .into_iter()
            .map(|(key, queue, started)| SessionSnapshot {
                key,
                queue_depth: queue.len(),
                age: now.saturating_duration_since(started),
            })
            .collect();
        sessions.sort_by(|a, b| a.key.cmp(&b.key));
        sessions
    }
}
