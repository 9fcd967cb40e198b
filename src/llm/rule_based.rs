//! Canned replies used when no model backend can answer

use super::types::{last_user_text, word_chunks, ChatMessage, ChunkStream, GenerateOptions};
use super::{ChatProvider, LlmError};
use async_trait::async_trait;

pub const RULE_BASED_NAME: &str = "rule-based";

const QUESTION_ECHO_CHARS: usize = 50;

/// Pattern-matched reply for a user message
pub fn canned_reply(message: &str) -> String {
    let lower = message.to_lowercase();
    let has_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has_any(&["hello", "hi", "hey"]) {
        "Hello! I'm an AI assistant. How can I help you today?".to_string()
    } else if has_any(&["how are you", "how do you do"]) {
        "I'm functioning well, thank you! I'm here to help you with any questions or tasks you have."
            .to_string()
    } else if has_any(&["your name", "who are you"]) {
        "I'm an AI assistant powered by this chatbot platform. I'm here to help answer your questions and assist with various tasks."
            .to_string()
    } else if has_any(&["help", "what can you do"]) {
        "I can help you with:\n\
         • Answering questions on various topics\n\
         • Providing information and explanations\n\
         • Assisting with problem-solving\n\
         • Having conversations\n\
         • And much more! Just ask me anything."
            .to_string()
    } else if message.contains('?') {
        let topic: String = message.chars().take(QUESTION_ECHO_CHARS).collect();
        format!(
            "That's an interesting question about '{topic}...'. While I'm currently running in basic mode, I'd be happy to discuss this topic with you. Could you provide more context?"
        )
    } else {
        "I understand. Could you tell me more about what you'd like to know or discuss? I'm here to help!"
            .to_string()
    }
}

/// Last tier of the fallback chain
#[derive(Debug, Default)]
pub struct RuleBasedProvider;

#[async_trait]
impl ChatProvider for RuleBasedProvider {
    async fn generate(
        &self,
        history: &[ChatMessage],
        _options: &GenerateOptions,
    ) -> Result<ChunkStream, LlmError> {
        let message = last_user_text(history).unwrap_or_default();
        Ok(word_chunks(&canned_reply(message)))
    }

    fn name(&self) -> &str {
        RULE_BASED_NAME
    }
}
