//! Common types for provider interactions

use super::LlmError;
use futures::stream::{self, BoxStream, StreamExt};

/// Message role as seen by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One role-tagged entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
        }
    }
}

/// Per-request generation knobs. Unset fields fall back to each backend's defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Incremental text output. `None` is end of output; `Some(Err)` is a failure.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

/// The most recent user message in the history, if any
pub fn last_user_text(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.text.as_str())
}

/// Emit a finished reply word by word.
///
/// Each chunk is a word plus the whitespace that follows it, so the chunks
/// concatenate back to the exact input (newlines and indentation included).
/// Text with no visible characters yields nothing.
pub fn word_chunks(text: &str) -> ChunkStream {
    let mut chunks: Vec<Result<String, LlmError>> = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        let starts_word = !c.is_whitespace()
            && current.ends_with(char::is_whitespace)
            && current.chars().any(|p| !p.is_whitespace());
        if starts_word {
            chunks.push(Ok(std::mem::take(&mut current)));
        }
        current.push(c);
    }
    if current.chars().any(|c| !c.is_whitespace()) {
        chunks.push(Ok(current));
    }

    stream::iter(chunks).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_word_chunks_rejoin() {
        let chunks: Vec<String> = word_chunks("Hello there,  friend")
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks, vec!["Hello ", "there,  ", "friend"]);
        assert_eq!(chunks.concat(), "Hello there,  friend");
    }

    #[tokio::test]
    async fn test_word_chunks_keep_layout() {
        let text = "Here:\n```rust\nfn main() {\n    println!(\"hi\");\n}\n```";
        let chunks: Vec<String> = word_chunks(text).map(Result::unwrap).collect().await;
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks[0], "Here:\n");
        assert_eq!(chunks[1], "```rust\n");
    }

    #[tokio::test]
    async fn test_word_chunks_leading_whitespace_stays_with_first_word() {
        let chunks: Vec<String> = word_chunks("\n  indented line").map(Result::unwrap).collect().await;
        assert_eq!(chunks, vec!["\n  indented ", "line"]);
    }

    #[tokio::test]
    async fn test_word_chunks_empty() {
        let chunks: Vec<_> = word_chunks("   ").collect().await;
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_last_user_text() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
            ChatMessage::assistant("another"),
        ];
        assert_eq!(last_user_text(&history), Some("second"));
        assert_eq!(last_user_text(&[]), None);
    }
}
