//! SessionStore — live coaching sessions keyed by `(user_id, session_id)`.
//!
//! Sessions live in memory for the life of the process and, when a database is
//! attached, are snapshotted to the settings table after every turn so a
//! resumed conversation picks up where it left off.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::store::Database;
use crate::tracker::{CoachSession, Record, SessionKey};

/// Settings key prefix for persisted session snapshots.
pub const SESSION_SETTING_PREFIX: &str = "coach_session:";

fn setting_key(key: &SessionKey) -> String {
    format!("{SESSION_SETTING_PREFIX}{}", key.session_id)
}

/// A shared handle to one live session.
pub type SessionHandle = Arc<Mutex<CoachSession>>;

/// Registry of live sessions with optional persistence.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
    db: Option<Arc<dyn Database>>,
}

impl SessionStore {
    /// In-memory only.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            db: None,
        }
    }

    /// Backed by `db` for snapshot and restore.
    pub fn with_database(db: Arc<dyn Database>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            db: Some(db),
        }
    }

    /// Return the live session for `key`, restoring a persisted snapshot or
    /// building a fresh one with `create` when there is none.
    ///
    /// A persisted snapshot is discarded when its record kind differs from the
    /// one `create` produces, or when it holds an already finalized record with
    /// a different sequence number (the caller is moving on to the next one).
    pub async fn get_or_create<F>(&self, key: &SessionKey, create: F) -> SessionHandle
    where
        F: FnOnce() -> CoachSession,
    {
        if let Some(handle) = self.sessions.read().await.get(key) {
            return Arc::clone(handle);
        }

        let fresh = create();
        let session = match self.restore(key).await {
            Some(restored) if restored.kind() != fresh.kind() => {
                tracing::warn!(
                    session = %key,
                    stored = %restored.kind(),
                    requested = %fresh.kind(),
                    "Stored session has a different record kind, starting fresh"
                );
                fresh
            }
            Some(restored)
                if restored.is_complete()
                    && restored.meta().sequence_number != fresh.meta().sequence_number =>
            {
                tracing::info!(
                    session = %key,
                    stored = restored.meta().sequence_number,
                    requested = fresh.meta().sequence_number,
                    "Stored record already finalized, starting the requested one"
                );
                fresh
            }
            Some(restored) => {
                tracing::info!(session = %key, phase = %restored.phase(), "Session restored");
                restored
            }
            None => fresh,
        };

        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(session))),
        )
    }

    /// Insert `session` under its own key, replacing any live entry.
    pub async fn insert(&self, session: CoachSession) -> SessionHandle {
        let key = session.key().clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .await
            .insert(key, Arc::clone(&handle));
        handle
    }

    /// Live session for `key`, if any.
    pub async fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Merge `incoming` into the retained memory for `key` and return the
    /// merged record. `None` when no session is live under `key`.
    pub async fn merge(&self, key: &SessionKey, incoming: &Record) -> Option<Record> {
        let handle = self.get(key).await?;
        let mut session = handle.lock().await;
        Some(session.merge_incoming(incoming).clone())
    }

    /// Snapshot the session under `key` to the database. Failures are logged
    /// and swallowed; the in-memory session stays authoritative.
    pub async fn persist(&self, key: &SessionKey) {
        let Some(db) = self.db.as_ref() else {
            return;
        };
        let Some(handle) = self.get(key).await else {
            return;
        };

        let value = {
            let session = handle.lock().await;
            match serde_json::to_value(&*session) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(session = %key, "Failed to serialize session: {}", e);
                    return;
                }
            }
        };

        if let Err(e) = db.set_setting(&key.user_id, &setting_key(key), &value).await {
            tracing::warn!(session = %key, "Failed to persist session: {}", e);
        }
    }

    async fn restore(&self, key: &SessionKey) -> Option<CoachSession> {
        let db = self.db.as_ref()?;
        let value = match db.get_setting(&key.user_id, &setting_key(key)).await {
            Ok(value) => value?,
            Err(e) => {
                tracing::warn!(session = %key, "Failed to load persisted session: {}", e);
                return None;
            }
        };
        match serde_json::from_value::<CoachSession>(value) {
            Ok(session) if session.key() == key => Some(session),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(session = %key, "Discarding unreadable session snapshot: {}", e);
                None
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
