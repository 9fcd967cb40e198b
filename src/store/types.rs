//! Session and turn records as persisted on disk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used until the first user turn arrives
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Characters of the first user message kept in the title
pub const MAX_TITLE_CHARS: usize = 50;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Backend that produced an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            model: None,
        }
    }

    pub fn assistant(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            model: Some(model.into()),
        }
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }

    /// Append a turn, bumping `updated_at` and deriving the title from the
    /// first user turn.
    pub fn push(&mut self, turn: Turn) {
        let first_user = turn.role == Role::User && !self.turns.iter().any(|t| t.role == Role::User);
        if first_user {
            self.title = derive_title(&turn.text);
        }
        self.updated_at = turn.timestamp.max(self.updated_at);
        self.turns.push(turn);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.turns.len(),
        }
    }
}

/// Listing entry (metadata only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// First `MAX_TITLE_CHARS` characters of the message, with an ellipsis when cut
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(MAX_TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
