//! Turn orchestration
//!
//! Records the user's message, walks the fallback chain until one backend
//! starts answering, and hands back a lazy stream of reply chunks. The
//! assistant turn is appended only when that stream runs to completion.

#[cfg(test)]
pub mod testing;

use crate::llm::{
    ChatMessage, ChatProvider, ChunkStream, GenerateOptions, LlmError, ModelSelector,
    ProviderRegistry,
};
use crate::store::{FileStore, Role, SessionStore, StoreError, Turn};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("All providers failed: {}", .attempts.join("; "))]
    AllProvidersFailed { attempts: Vec<String> },
    #[error("Response stream interrupted: {0}")]
    StreamInterrupted(LlmError),
}

/// Reply chunks for one turn. Ends after the assistant turn is saved, or with
/// a single terminal `Err`.
pub type TurnStream = BoxStream<'static, Result<String, TurnError>>;

pub struct TurnOrchestrator<S: SessionStore = FileStore> {
    store: Arc<S>,
    registry: Arc<ProviderRegistry>,
}

impl<S: SessionStore + 'static> TurnOrchestrator<S> {
    pub fn new(store: Arc<S>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Record `message` and start answering it.
    ///
    /// Returns the session id (allocated when `session_id` is `None`) and the
    /// reply stream. Nothing is generated until the stream is polled;
    /// dropping it early leaves the session with only the user turn.
    pub async fn handle(
        &self,
        session_id: Option<String>,
        message: &str,
        model: ModelSelector,
    ) -> Result<(String, TurnStream), TurnError> {
        if message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let session_id = match session_id {
            Some(id) => {
                crate::store::validate_session_id(&id)?;
                id
            }
            // The first append creates the session, so a failed write leaves nothing behind
            None => uuid::Uuid::new_v4().to_string(),
        };

        let session = self.store.append(&session_id, Turn::user(message)).await?;
        tracing::info!(
            session_id = %session_id,
            model = %model,
            turns = session.turns.len(),
            "Recorded user turn"
        );

        let history: Vec<ChatMessage> = session
            .turns
            .into_iter()
            .map(|turn| match turn.role {
                Role::User => ChatMessage::user(turn.text),
                Role::Assistant => ChatMessage::assistant(turn.text),
            })
            .collect();

        let stream = respond(
            Arc::clone(&self.store),
            self.registry.fallback_chain(model),
            session_id.clone(),
            history,
            self.registry.generate_options().clone(),
        );
        Ok((session_id, stream))
    }

    /// Run a whole turn without streaming. Returns the session id and the
    /// saved assistant turn.
    pub async fn complete(
        &self,
        session_id: Option<String>,
        message: &str,
        model: ModelSelector,
    ) -> Result<(String, Turn), TurnError> {
        let (session_id, stream) = self.handle(session_id, message, model).await?;
        let reply = collect(stream).await?;

        // The saved turn carries the answering backend
        let session = self.store.get(&session_id).await?;
        let turn = session
            .turns
            .into_iter()
            .rev()
            .find(|t| t.role == Role::Assistant && t.text == reply)
            .unwrap_or_else(|| Turn::assistant(reply, model.id()));
        Ok((session_id, turn))
    }
}

/// Drive a reply stream to its end and return the concatenated text
pub async fn collect(mut stream: TurnStream) -> Result<String, TurnError> {
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        reply.push_str(&chunk?);
    }
    Ok(reply)
}

/// Start a provider and wait for its first non-empty chunk
async fn start_provider(
    provider: &dyn ChatProvider,
    history: &[ChatMessage],
    options: &GenerateOptions,
) -> Result<(String, ChunkStream), LlmError> {
    let mut stream = provider.generate(history, options).await?;
    while let Some(item) = stream.next().await {
        let chunk = item?;
        if !chunk.is_empty() {
            return Ok((chunk, stream));
        }
    }
    Err(LlmError::unavailable("Provider produced no output"))
}

fn respond<S: SessionStore + 'static>(
    store: Arc<S>,
    chain: Vec<Arc<dyn ChatProvider>>,
    session_id: String,
    history: Vec<ChatMessage>,
    options: GenerateOptions,
) -> TurnStream {
    async_stream::stream! {
        let mut attempts = Vec::with_capacity(chain.len());
        let mut started = None;

        for provider in chain {
            let attempt = start_provider(provider.as_ref(), &history, &options).await;
            match attempt {
                Ok((first, rest)) => {
                    started = Some((provider, first, rest));
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        provider = %provider.name(),
                        kind = e.kind.as_str(),
                        error = %e,
                        "Provider unavailable, trying next"
                    );
                    attempts.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        let Some((provider, first, mut rest)) = started else {
            tracing::error!(session_id = %session_id, "No provider could answer");
            yield Err(TurnError::AllProvidersFailed { attempts });
            return;
        };

        let mut reply = first.clone();
        yield Ok(first);

        while let Some(item) = rest.next().await {
            match item {
                Ok(chunk) if chunk.is_empty() => {}
                Ok(chunk) => {
                    reply.push_str(&chunk);
                    yield Ok(chunk);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        provider = %provider.name(),
                        error = %e,
                        "Reply interrupted, discarding partial text"
                    );
                    yield Err(TurnError::StreamInterrupted(e));
                    return;
                }
            }
        }

        match store.append(&session_id, Turn::assistant(reply, provider.name())).await {
            Ok(session) => {
                tracing::info!(
                    session_id = %session_id,
                    provider = %provider.name(),
                    turns = session.turns.len(),
                    "Recorded assistant turn"
                );
            }
            Err(e) => {
                yield Err(TurnError::Store(e));
            }
        }
    }
    .boxed()
}
