//! Mock providers and stores for orchestrator tests

use crate::llm::{ChatMessage, ChatProvider, ChunkStream, GenerateOptions, LlmError};
use crate::store::{FileStore, Session, SessionStore, SessionSummary, StoreResult, Turn};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Script {
    Chunks(Vec<String>),
    FailToStart,
    /// Yields these chunks, then a stream error
    FailAfter(Vec<String>),
    /// Yields these chunks, then never finishes
    HangAfter(Vec<String>),
}

/// Provider that plays back a fixed script and records what it was asked
pub struct MockProvider {
    name: String,
    script: Script,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
    options: Mutex<Option<GenerateOptions>>,
}

impl MockProvider {
    fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            histories: Mutex::new(Vec::new()),
            options: Mutex::new(None),
        }
    }

    fn owned(chunks: &[&str]) -> Vec<String> {
        chunks.iter().map(|c| (*c).to_string()).collect()
    }

    pub fn chunks(name: &str, chunks: &[&str]) -> Self {
        Self::new(name, Script::Chunks(Self::owned(chunks)))
    }

    /// Finishes without producing any text
    pub fn empty(name: &str) -> Self {
        Self::new(name, Script::Chunks(vec![String::new()]))
    }

    pub fn fail_to_start(name: &str) -> Self {
        Self::new(name, Script::FailToStart)
    }

    pub fn fail_after(name: &str, chunks: &[&str]) -> Self {
        Self::new(name, Script::FailAfter(Self::owned(chunks)))
    }

    pub fn hang_after(name: &str, chunks: &[&str]) -> Self {
        Self::new(name, Script::HangAfter(Self::owned(chunks)))
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn last_history(&self) -> Vec<ChatMessage> {
        self.histories.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn last_options(&self) -> Option<GenerateOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn generate(
        &self,
        history: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError> {
        self.histories.lock().unwrap().push(history.to_vec());
        *self.options.lock().unwrap() = Some(options.clone());

        let ok = |chunks: &Vec<String>| chunks.iter().cloned().map(Ok).collect::<Vec<_>>();
        match &self.script {
            Script::Chunks(chunks) => Ok(stream::iter(ok(chunks)).boxed()),
            Script::FailToStart => Err(LlmError::network("connection refused")),
            Script::FailAfter(chunks) => {
                let mut items = ok(chunks);
                items.push(Err(LlmError::server_error("backend dropped the stream")));
                Ok(stream::iter(items).boxed())
            }
            Script::HangAfter(chunks) => Ok(stream::iter(ok(chunks)).chain(stream::pending()).boxed()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Store whose every operation fails with an I/O error
pub struct FailingStore;

fn disk_full<T>() -> StoreResult<T> {
    Err(std::io::Error::other("disk full").into())
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn create(&self) -> StoreResult<Session> {
        disk_full()
    }

    async fn append(&self, _session_id: &str, _turn: Turn) -> StoreResult<Session> {
        disk_full()
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        disk_full()
    }

    async fn get(&self, _session_id: &str) -> StoreResult<Session> {
        disk_full()
    }

    async fn delete(&self, _session_id: &str) -> StoreResult<()> {
        disk_full()
    }

    async fn clear(&self) -> StoreResult<()> {
        disk_full()
    }
}

/// File store whose appends always fail; everything else goes to disk
pub struct AppendFailsStore {
    inner: FileStore,
}

impl AppendFailsStore {
    pub fn new(inner: FileStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SessionStore for AppendFailsStore {
    async fn create(&self) -> StoreResult<Session> {
        self.inner.create().await
    }

    async fn append(&self, _session_id: &str, _turn: Turn) -> StoreResult<Session> {
        disk_full()
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        self.inner.list().await
    }

    async fn get(&self, session_id: &str) -> StoreResult<Session> {
        self.inner.get(session_id).await
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.inner.delete(session_id).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.inner.clear().await
    }
}
