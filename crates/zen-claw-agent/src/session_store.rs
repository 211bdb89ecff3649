//! Session Store: durable, crash-safe, one JSON file per session (spec §4.F).

use crate::error::SessionError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use zen_claw_core::{Session, SessionState};

/// Lightweight index entry kept in RAM so admission control and `list()`
/// don't require reading every session file from disk.
#[derive(Debug, Clone)]
struct IndexEntry {
    state: SessionState,
    updated_at: OffsetDateTime,
}

pub struct StorageInfo {
    pub storage_path: PathBuf,
    pub size_bytes: u64,
    pub count: usize,
}

/// Process-wide singleton (spec §5): one store-level `RwLock` over the
/// session index, one per-session `tokio::sync::Mutex` (held in a
/// `DashMap`) serializing task execution and persistence for that session.
pub struct SessionStore {
    data_dir: PathBuf,
    max_sessions: usize,
    index: RwLock<HashMap<String, IndexEntry>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub async fn open(data_dir: impl Into<PathBuf>, max_sessions: usize) -> Result<Self, SessionError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut index = HashMap::new();
        let mut entries = tokio::fs::read_dir(&data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let session: Session = serde_json::from_slice(&bytes)?;
            index.insert(session.id.clone(), IndexEntry { state: session.state, updated_at: session.updated_at });
        }

        Ok(SessionStore { data_dir, max_sessions, index: RwLock::new(index), locks: DashMap::new() })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    /// The mutex serializing tasks and persistence for one session id
    /// (spec §5 one-task-per-session). Acquired, never replaced, for the
    /// lifetime of the store.
    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Fails fast (does not queue) if a task is already running on this
    /// session, per spec §5.
    pub fn try_begin_task(&self, id: &str) -> Result<OwnedMutexGuard<()>, SessionError> {
        self.lock_for(id).try_lock_owned().map_err(|_| SessionError::Busy(id.to_string()))
    }

    pub async fn load(&self, id: &str) -> Result<Session, SessionError> {
        let bytes = tokio::fs::read(self.path_for(id))
            .await
            .map_err(|_| SessionError::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Creates a new session, admitting it per `max_sessions` (spec §4.F
    /// Admission): if the active count would exceed the bound, the
    /// least-recently-updated active session is transitioned to
    /// `background` first.
    pub async fn create(&self, session: Session) -> Result<Session, SessionError> {
        self.enforce_admission().await?;
        self.save(&session).await?;
        Ok(session)
    }

    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(session)?;
        let final_path = self.path_for(&session.id);
        let tmp_path = self.data_dir.join(format!("{}.json.tmp", session.id));
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        self.index.write().await.insert(
            session.id.clone(),
            IndexEntry { state: session.state, updated_at: session.updated_at },
        );
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        tokio::fs::remove_file(self.path_for(id))
            .await
            .map_err(|_| SessionError::NotFound(id.to_string()))?;
        self.index.write().await.remove(id);
        self.locks.remove(id);
        Ok(())
    }

    /// Idempotent: setting a session's state to what it already is is a no-op success.
    pub async fn set_state(&self, id: &str, state: SessionState) -> Result<Session, SessionError> {
        let mut session = self.load(id).await?;
        session.state = state;
        session.touch();
        self.save(&session).await?;
        Ok(session)
    }

    pub async fn list(&self) -> Vec<(String, SessionState, OffsetDateTime)> {
        self.index
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.state, e.updated_at))
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.index.read().await.values().filter(|e| e.state == SessionState::Active).count()
    }

    /// Deletes every terminated session, and every session (of any state)
    /// whose `updated_at` is older than `older_than`, if given.
    pub async fn clean(&self, older_than: Option<time::Duration>) -> Result<usize, SessionError> {
        let candidates: Vec<String> = {
            let index = self.index.read().await;
            index
                .iter()
                .filter(|(_, e)| {
                    e.state == SessionState::Terminated
                        || older_than.is_some_and(|d| OffsetDateTime::now_utc() - e.updated_at > d)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in &candidates {
            self.delete(id).await?;
        }
        Ok(candidates.len())
    }

    pub async fn info(&self) -> Result<StorageInfo, SessionError> {
        let mut size_bytes = 0u64;
        let mut count = 0usize;
        let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                size_bytes += entry.metadata().await?.len();
                count += 1;
            }
        }
        Ok(StorageInfo { storage_path: self.data_dir.clone(), size_bytes, count })
    }

    async fn enforce_admission(&self) -> Result<(), SessionError> {
        let lru = {
            let index = self.index.read().await;
            if index.values().filter(|e| e.state == SessionState::Active).count() < self.max_sessions {
                None
            } else {
                index
                    .iter()
                    .filter(|(_, e)| e.state == SessionState::Active)
                    .min_by_key(|(_, e)| e.updated_at)
                    .map(|(id, _)| id.clone())
            }
        };
        if let Some(id) = lru {
            self.set_state(&id, SessionState::Background).await?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn store(max_sessions: usize) -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path(), max_sessions).await.unwrap();
        (dir, store)
    }

    fn new_session(id: &str) -> Session {
        Session::new(id, PathBuf::from("."), "openai".into(), "gpt-4o".into())
    }

    #[tokio::test]
    async fn create_and_load_round_trips() {
        let (_dir, store) = store(5).await;
        store.create(new_session("s1")).await.unwrap();
        let loaded = store.load("s1").await.unwrap();
        assert_eq!(loaded.id, "s1");
    }

    #[tokio::test]
    async fn loading_unknown_session_is_not_found() {
        let (_dir, store) = store(5).await;
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_task_on_busy_session_fails_fast() {
        let (_dir, store) = store(5).await;
        store.create(new_session("s1")).await.unwrap();
        let _guard = store.try_begin_task("s1").unwrap();
        let err = store.try_begin_task("s1").unwrap_err();
        assert!(matches!(err, SessionError::Busy(_)));
    }

    #[tokio::test]
    async fn admission_backgrounds_lru_active_session_beyond_bound() {
        let (_dir, store) = store(2).await;
        store.create(new_session("s1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create(new_session("s2")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create(new_session("s3")).await.unwrap();

        assert!(store.active_count().await <= 2);
        let s1 = store.load("s1").await.unwrap();
        assert_eq!(s1.state, SessionState::Background);
    }

    #[tokio::test]
    async fn delete_removes_file_and_index_entry() {
        let (_dir, store) = store(5).await;
        store.create(new_session("s1")).await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(store.load("s1").await.is_err());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn clean_deletes_terminated_sessions() {
        let (_dir, store) = store(5).await;
        store.create(new_session("s1")).await.unwrap();
        store.set_state("s1", SessionState::Terminated).await.unwrap();
        let cleaned = store.clean(None).await.unwrap();
        assert_eq!(cleaned, 1);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn reopening_store_rebuilds_index_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::open(dir.path(), 5).await.unwrap();
            store.create(new_session("s1")).await.unwrap();
        }
        let reopened = SessionStore::open(dir.path(), 5).await.unwrap();
        assert_eq!(reopened.list().await.len(), 1);
    }
}
