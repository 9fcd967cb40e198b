//! Conversation store
//!
//! Persists each session as a single JSON file under the data directory.
//! Writes go to a temporary file that is renamed over the target, so a reader
//! never observes a half-written session. Appends to one session are
//! serialized; different sessions never wait on each other.

mod export;
mod types;

#[cfg(test)]
mod proptests;

pub use export::{export_session, ExportFormat};
pub use types::*;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex;

const SESSION_EXT: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt session data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for chat sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a fresh session with no turns
    async fn create(&self) -> StoreResult<Session>;

    /// Append a turn, creating the session if it does not exist yet
    async fn append(&self, session_id: &str, turn: Turn) -> StoreResult<Session>;

    /// All sessions, most recently updated first
    async fn list(&self) -> StoreResult<Vec<SessionSummary>>;

    async fn get(&self, session_id: &str) -> StoreResult<Session>;

    /// Remove a session. Unknown ids are not an error.
    async fn delete(&self, session_id: &str) -> StoreResult<()>;

    async fn clear(&self) -> StoreResult<()>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn create(&self) -> StoreResult<Session> {
        (**self).create().await
    }

    async fn append(&self, session_id: &str, turn: Turn) -> StoreResult<Session> {
        (**self).append(session_id, turn).await
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        (**self).list().await
    }

    async fn get(&self, session_id: &str) -> StoreResult<Session> {
        (**self).get(session_id).await
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        (**self).delete(session_id).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }
}

/// Check that a caller-supplied id is safe to use as a file name
pub fn validate_session_id(session_id: &str) -> StoreResult<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSessionId(session_id.to_string()))
    }
}

/// One-file-per-session JSON store
pub struct FileStore {
    dir: PathBuf,
    /// Per-session locks serializing read-modify-write cycles
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.{SESSION_EXT}"))
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Drop lock entries nobody else is waiting on
    fn forget_idle_locks(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let path = self.session_path(session_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the session atomically.
    ///
    /// The write runs to completion on the blocking pool even if the caller
    /// stops waiting, so a temp file is always either renamed into place or
    /// removed.
    async fn save(&self, session: &Session) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(session)?;
        let dir = self.dir.clone();
        let path = self.session_path(&session.session_id);
        let prefix = format!(".{}.", session.session_id);

        tokio::task::spawn_blocking(move || write_then_rename(&dir, &prefix, &path, &json))
            .await
            .map_err(std::io::Error::other)??;

        tracing::debug!(session_id = %session.session_id, turns = session.turns.len(), "Saved session");
        Ok(())
    }

    /// Session files and leftover temp files, in that order
    async fn scan(&self) -> StoreResult<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut sessions = Vec::new();
        let mut temps = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                if name.ends_with(TEMP_SUFFIX) {
                    temps.push(path);
                }
            } else if path.extension().is_some_and(|ext| ext == SESSION_EXT) {
                sessions.push(path);
            }
        }
        Ok((sessions, temps))
    }
}

fn write_then_rename(dir: &Path, prefix: &str, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    // Removed on drop unless persisted
    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn create(&self) -> StoreResult<Session> {
        let session = Session::new(uuid::Uuid::new_v4().to_string());
        self.save(&session).await?;
        tracing::info!(session_id = %session.session_id, "Created session");
        Ok(session)
    }

    async fn append(&self, session_id: &str, turn: Turn) -> StoreResult<Session> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = match self.load(session_id).await? {
            Some(existing) => existing,
            None => {
                tracing::info!(session_id = %session_id, "Creating session on first append");
                Session::new(session_id)
            }
        };
        session.push(turn);
        self.save(&session).await?;
        Ok(session)
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let (files, _) = self.scan().await?;
        let mut summaries = Vec::new();
        for path in files {
            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Session>(&bytes).map_err(StoreError::from),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(session) => summaries.push(session.summary()),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file");
                }
            }
        }

        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(summaries)
    }

    async fn get(&self, session_id: &str) -> StoreResult<Session> {
        validate_session_id(session_id)?;
        self.load(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        validate_session_id(session_id)?;
        {
            let lock = self.session_lock(session_id);
            let _guard = lock.lock().await;
            remove_if_present(&self.session_path(session_id)).await?;
        }
        self.forget_idle_locks();
        tracing::info!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        let (files, temps) = self.scan().await?;
        let count = files.len();
        for path in files.iter().chain(&temps) {
            remove_if_present(path).await?;
        }
        self.forget_idle_locks();
        tracing::info!(count, stale_temps = temps.len(), "Cleared all sessions");
        Ok(())
    }
}
