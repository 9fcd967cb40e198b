//! Rendering a session for download

use super::{Role, Session};
use std::fmt::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Text,
    Markdown,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!("Unsupported export format: {other}")),
        }
    }
}

pub fn export_session(session: &Session, format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(session),
        ExportFormat::Text => Ok(render_text(session)),
        ExportFormat::Markdown => Ok(render_markdown(session)),
    }
}

fn render_text(session: &Session) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "Conversation: {}", session.title);
    let _ = writeln!(out, "Created: {}", session.created_at.to_rfc3339());
    let _ = writeln!(out, "{}\n", "=".repeat(50));

    for turn in &session.turns {
        let who = match turn.role {
            Role::User => "You",
            Role::Assistant => "AI",
        };
        let _ = writeln!(out, "{who}: {}\n", turn.text);
    }
    out
}

fn render_markdown(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", session.title);
    let _ = writeln!(out, "**Created:** {}\n", session.created_at.to_rfc3339());
    let _ = writeln!(out, "---\n");

    for turn in &session.turns {
        let who = match turn.role {
            Role::User => "**You**",
            Role::Assistant => "**AI**",
        };
        let _ = writeln!(out, "{who}: {}\n", turn.text);
    }
    out
}
