//! Session Management
//!
//! In-memory, per-session message history. A single coarse mutex guards the
//! session map and every append; it is held only for the mutation itself,
//! never across an `.await`.
//!
//! Each session also owns a turn lock (`tokio::sync::Mutex<()>`). The
//! orchestrator holds it for a whole turn through a [`SessionTurn`] so two
//! concurrent turns on the same session run one after the other instead of
//! interleaving. Clearing a session invalidates the running turn's
//! generation; its remaining writes are dropped rather than recreating the
//! session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::message::Message;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A conversation session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Ordered message history
    pub messages: Vec<Message>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<SessionId, Session>,
    turn_locks: HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>,
    /// Generation claimed by the turn currently running on a session
    generations: HashMap<SessionId, u64>,
    next_generation: u64,
}

impl StoreInner {
    fn extend(&mut self, id: &SessionId, messages: impl IntoIterator<Item = Message>) {
        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        session.messages.extend(messages);
        session.touch();
    }

    fn claim_generation(&mut self, id: &SessionId) -> u64 {
        let next = &mut self.next_generation;
        *self.generations.entry(id.clone()).or_insert_with(|| {
            *next += 1;
            *next
        })
    }

    fn is_current(&self, id: &SessionId, generation: u64) -> bool {
        self.generations.get(id) == Some(&generation)
    }

    /// Drop the turn lock and generation of a session nobody is running or awaiting
    fn release_idle(&mut self, id: &SessionId) {
        if self
            .turn_locks
            .get(id)
            .is_none_or(|lock| Arc::strong_count(lock) == 1)
        {
            self.turn_locks.remove(id);
            self.generations.remove(id);
        }
    }
}

/// In-memory session store
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("active_sessions", &self.active_count())
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message, creating the session on first use
    pub fn append(&self, id: &SessionId, message: Message) {
        self.append_all(id, std::iter::once(message));
    }

    /// Append messages in order within a single critical section
    pub fn append_all(&self, id: &SessionId, messages: impl IntoIterator<Item = Message>) {
        self.lock().extend(id, messages);
    }

    /// Owned copy of the session's history; empty for unknown sessions
    pub fn snapshot(&self, id: &SessionId) -> Vec<Message> {
        self.lock()
            .sessions
            .get(id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Owned copy of the whole session
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.lock().sessions.get(id).cloned()
    }

    /// Number of messages; 0 for unknown sessions
    pub fn message_count(&self, id: &SessionId) -> usize {
        self.lock().sessions.get(id).map_or(0, Session::message_count)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.lock().sessions.contains_key(id)
    }

    /// Remove a session; returns whether it existed
    ///
    /// A turn running on the session loses its generation, so none of its
    /// later writes land.
    pub fn clear(&self, id: &SessionId) -> bool {
        let mut inner = self.lock();
        inner.generations.remove(id);
        inner.release_idle(id);
        inner.sessions.remove(id).is_some()
    }

    /// Remove every session
    pub fn clear_all(&self) {
        let mut inner = self.lock();
        inner.sessions.clear();
        inner.generations.clear();
        inner.turn_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of sessions currently held
    pub fn active_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Ids of all sessions, sorted
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.lock().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start a turn on a session; call [`SessionTurn::acquire`] before writing
    pub fn begin_turn(&self, id: &SessionId) -> SessionTurn<'_> {
        let lock = Arc::clone(self.lock().turn_locks.entry(id.clone()).or_default());
        SessionTurn {
            store: self,
            id: id.clone(),
            lock: Some(lock),
            guard: None,
            generation: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn turn_lock_count(&self) -> usize {
        self.lock().turn_locks.len()
    }
}

/// One turn's claim on a session
///
/// Once acquired it holds the session's turn lock, so turns on the same
/// session run one after the other. Writes go through the turn and are
/// dropped once the session has been cleared under it. Dropping the turn,
/// acquired or not, releases lock bookkeeping nobody else needs.
pub struct SessionTurn<'a> {
    store: &'a SessionStore,
    id: SessionId,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
    generation: u64,
}

impl SessionTurn<'_> {
    /// Wait for the session's turn lock
    pub async fn acquire(&mut self) {
        if self.guard.is_some() {
            return;
        }
        let Some(lock) = self.lock.clone() else {
            return;
        };
        self.guard = Some(lock.lock_owned().await);
        self.generation = self.store.lock().claim_generation(&self.id);
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the turn holds the lock and the session was not cleared since
    pub fn is_current(&self) -> bool {
        self.guard.is_some() && self.store.lock().is_current(&self.id, self.generation)
    }

    /// Append one message; `false` if the write was dropped
    pub fn append(&self, message: Message) -> bool {
        self.append_all(std::iter::once(message))
    }

    /// Append messages in one critical section; `false` if the write was dropped
    pub fn append_all(&self, messages: impl IntoIterator<Item = Message>) -> bool {
        if self.guard.is_none() {
            return false;
        }
        let mut inner = self.store.lock();
        if !inner.is_current(&self.id, self.generation) {
            return false;
        }
        inner.extend(&self.id, messages);
        true
    }

    /// Owned copy of the history; `None` once the session was cleared
    pub fn snapshot(&self) -> Option<Vec<Message>> {
        if self.guard.is_none() {
            return None;
        }
        let inner = self.store.lock();
        inner.is_current(&self.id, self.generation).then(|| {
            inner
                .sessions
                .get(&self.id)
                .map(|s| s.messages.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for SessionTurn<'_> {
    fn drop(&mut self) {
        self.guard = None;
        self.lock = None;
        self.store.lock().release_idle(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_is_empty() {
        let store = SessionStore::new();
        let id = SessionId::from("nobody");

        assert_eq!(store.message_count(&id), 0);
        assert!(store.snapshot(&id).is_empty());
        assert!(!store.contains(&id));
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_lazy_creation_on_append() {
        let store = SessionStore::new();
        let id = SessionId::new();

        store.append(&id, Message::user("hi"));
        store.append(&id, Message::assistant("hello"));

        assert_eq!(store.active_count(), 1);
        assert_eq!(store.message_count(&id), 2);
        let session = store.get(&id).unwrap();
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = SessionStore::new();
        let id = SessionId::from("s");
        store.append(&id, Message::user("one"));

        let snapshot = store.snapshot(&id);
        store.append(&id, Message::assistant("two"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.message_count(&id), 2);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = SessionStore::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.append(&a, Message::user("x"));
        store.append(&b, Message::user("y"));

        assert!(store.clear(&a));
        assert!(!store.clear(&a));
        assert!(!store.clear(&SessionId::from("never")));
        assert_eq!(store.active_count(), 1);

        store.clear_all();
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test]
    async fn test_turn_writes_need_the_lock() {
        let store = SessionStore::new();
        let id = SessionId::from("s");

        let mut turn = store.begin_turn(&id);
        assert!(!turn.append(Message::user("too early")));
        assert!(turn.snapshot().is_none());

        turn.acquire().await;
        assert!(turn.is_current());
        assert!(turn.append(Message::user("hi")));
        assert_eq!(turn.snapshot().unwrap().len(), 1);
        assert_eq!(store.message_count(&id), 1);
    }

    #[tokio::test]
    async fn test_clear_invalidates_running_turn() {
        let store = SessionStore::new();
        let id = SessionId::from("s");

        let mut turn = store.begin_turn(&id);
        turn.acquire().await;
        assert!(turn.append(Message::user("hi")));

        assert!(store.clear(&id));
        assert!(!turn.is_current());
        assert!(turn.snapshot().is_none());
        assert!(!turn.append_all([Message::assistant("late")]));
        assert!(!store.contains(&id));
        drop(turn);

        // The next turn starts a fresh session
        let mut next = store.begin_turn(&id);
        next.acquire().await;
        assert!(next.append(Message::user("again")));
        assert_eq!(store.message_count(&id), 1);
    }

    #[tokio::test]
    async fn test_clear_all_invalidates_running_turns() {
        let store = SessionStore::new();
        let id = SessionId::from("s");

        let mut turn = store.begin_turn(&id);
        turn.acquire().await;
        assert!(turn.append(Message::user("hi")));

        store.clear_all();
        assert!(!turn.append(Message::assistant("late")));
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_turn_waits_for_the_first() {
        let store = SessionStore::new();
        let id = SessionId::from("busy");

        let mut first = store.begin_turn(&id);
        first.acquire().await;

        let mut second = store.begin_turn(&id);
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), second.acquire()).await;
        assert!(waited.is_err());

        drop(first);
        second.acquire().await;
        assert!(second.is_current());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_turns_release_their_lock() {
        let store = SessionStore::new();
        let id = SessionId::from("ghost");

        let mut holder = store.begin_turn(&id);
        holder.acquire().await;

        let mut waiter = store.begin_turn(&SessionId::from("ghost"));
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(10), waiter.acquire()).await;
        assert!(waited.is_err());
        drop(waiter);
        assert_eq!(store.turn_lock_count(), 1);

        drop(holder);
        assert_eq!(store.turn_lock_count(), 0);
        assert_eq!(store.active_count(), 0);

        // Never acquired at all
        drop(store.begin_turn(&SessionId::from("never")));
        assert_eq!(store.turn_lock_count(), 0);
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let store = Arc::new(SessionStore::new());
        let id = SessionId::from("shared");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        store.append(&id, Message::user(format!("{i}-{j}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.message_count(&id), 200);
    }
}
