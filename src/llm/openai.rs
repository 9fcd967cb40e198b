//! `OpenAI`-compatible hosted provider with streamed chat completions

use super::types::{ChatMessage, ChunkStream, GenerateOptions};
use super::{ChatProvider, LlmError, ModelSelector};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are a helpful, intelligent AI assistant. You provide clear, accurate, and thoughtful responses.";

/// Only the tail of the conversation is sent
const HISTORY_WINDOW: usize = 10;
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Hosted chat-completions service
pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: ModelSelector,
    url: String,
}

impl OpenAIService {
    pub fn new(
        api_key: String,
        model: ModelSelector,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            url: format!("{base}/chat/completions"),
        })
    }

    fn translate_request(&self, history: &[ChatMessage], options: &GenerateOptions) -> OpenAIRequest {
        let mut messages = vec![OpenAIMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        }];

        let start = history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend(history[start..].iter().map(|m| OpenAIMessage {
            role: m.role.as_str().to_string(),
            content: m.text.clone(),
        }));

        OpenAIRequest {
            model: self.model.def().api_name.to_string(),
            messages,
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: true,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIService {
    async fn generate(
        &self,
        history: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError> {
        let request = self.translate_request(history, options);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        Ok(sse_chunks(response.bytes_stream()).boxed())
    }

    fn name(&self) -> &str {
        self.model.id()
    }
}

/// One parsed line of a server-sent event stream
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        // comments, event names, keep-alives
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    if let Ok(err) = serde_json::from_str::<OpenAIErrorResponse>(data) {
        return Err(LlmError::server_error(format!("Stream error: {}", err.error.message)));
    }

    let chunk: OpenAIStreamChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::unknown(format!("Failed to parse stream chunk: {e} - data: {data}")))?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();

    if text.is_empty() {
        Ok(SseLine::Skip)
    } else {
        Ok(SseLine::Delta(text))
    }
}

/// Turn a raw SSE byte stream into text deltas.
///
/// Lines may be split across network chunks, so bytes are buffered until a
/// newline arrives. The stream ends at `[DONE]` or when the body ends.
fn sse_chunks<S, B, E>(body: S) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(LlmError::network(format!("Stream read failed: {e}")));
                    return;
                }
            };
            buffer.extend_from_slice(bytes.as_ref());

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                match parse_sse_line(line.trim_end()) {
                    Ok(SseLine::Delta(text)) => {
                        yield Ok(text);
                    }
                    Ok(SseLine::Done) => return,
                    Ok(SseLine::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        // Trailing line without a newline
        let line = String::from_utf8_lossy(&buffer).into_owned();
        match parse_sse_line(line.trim()) {
            Ok(SseLine::Delta(text)) => {
                yield Ok(text);
            }
            Ok(SseLine::Done | SseLine::Skip) => {}
            Err(e) => {
                yield Err(e);
            }
        }
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
