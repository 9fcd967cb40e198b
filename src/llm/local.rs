//! Locally served model (llama.cpp-style `/completion` endpoint)
//!
//! The local server returns the whole completion at once; the text is then
//! emitted word by word so callers see the same incremental shape as the
//! hosted stream.

use super::types::{word_chunks, ChatMessage, ChunkStream, GenerateOptions, MessageRole};
use super::{ChatProvider, LlmError, ModelSelector};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HISTORY_WINDOW: usize = 5;
const DEFAULT_N_PREDICT: u32 = 150;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;

pub struct LocalModelService {
    client: Client,
    model: ModelSelector,
    url: String,
}

impl LocalModelService {
    pub fn new(base_url: &str, model: ModelSelector, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            model,
            url: format!("{}/completion", base_url.trim_end_matches('/')),
        })
    }
}

/// `User:` / `AI:` transcript of the recent history, ending with an open `AI:` turn
fn build_prompt(history: &[ChatMessage]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut prompt = String::new();
    for msg in &history[start..] {
        let speaker = match msg.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "AI",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&msg.text);
        prompt.push('\n');
    }
    prompt.push_str("AI:");
    prompt
}

#[async_trait]
impl ChatProvider for LocalModelService {
    async fn generate(
        &self,
        history: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError> {
        let request = CompletionRequest {
            model: self.model.def().api_name,
            prompt: build_prompt(history),
            n_predict: options.max_tokens.unwrap_or(DEFAULT_N_PREDICT),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: TOP_P,
            stop: vec!["\nUser:"],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::unknown(format!("Failed to parse response: {e} - body: {body}")))?;

        let text = completion.content.trim();
        if text.is_empty() {
            return Err(LlmError::unavailable("Local model returned an empty completion"));
        }
        Ok(word_chunks(text))
    }

    fn name(&self) -> &str {
        self.model.id()
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: &'static str,
    prompt: String,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    stop: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}
