//! LLM provider abstraction
//!
//! A closed set of backends (hosted API, local model, canned replies) behind
//! one streaming `generate` capability.

mod error;
mod local;
mod models;
mod openai;
mod registry;
mod rule_based;
mod types;

#[allow(unused_imports)] // Public API re-exports
pub use error::{LlmError, LlmErrorKind};
pub use local::LocalModelService;
pub use models::{all_models, Backend, ModelSelector};
pub use openai::OpenAIService;
pub use registry::{LlmConfig, ProviderRegistry};
#[allow(unused_imports)]
pub use rule_based::{canned_reply, RuleBasedProvider, RULE_BASED_NAME};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Common interface for completion backends
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start generating a reply to `history`.
    ///
    /// An `Err` here means the backend could not start at all; failures after
    /// that arrive as `Err` items in the returned stream.
    async fn generate(
        &self,
        history: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError>;

    /// Name recorded on the assistant turn (e.g. "gpt-4", "rule-based")
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: ChatProvider + ?Sized> ChatProvider for Arc<T> {
    async fn generate(
        &self,
        history: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError> {
        (**self).generate(history, options).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for providers
pub struct LoggingProvider {
    inner: Arc<dyn ChatProvider>,
    name: String,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn ChatProvider>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl ChatProvider for LoggingProvider {
    async fn generate(
        &self,
        history: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(history, options).await;
        let duration = start.elapsed();

        match result {
            Ok(stream) => {
                tracing::info!(
                    provider = %self.name,
                    duration_ms = %duration.as_millis(),
                    history_len = history.len(),
                    "Provider stream started"
                );
                let name = self.name.clone();
                Ok(stream
                    .inspect(move |item| {
                        if let Err(e) = item {
                            tracing::warn!(
                                provider = %name,
                                error = %e.message,
                                kind = e.kind.as_str(),
                                "Provider stream failed"
                            );
                        }
                    })
                    .boxed())
            }
            Err(e) => {
                tracing::error!(
                    provider = %self.name,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "Provider request failed"
                );
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
