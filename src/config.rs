//! Server configuration from environment variables

use crate::llm::LlmConfig;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Directory holding one JSON file per session
    pub data_dir: PathBuf,
    /// Frontend assets served for unmatched paths
    pub static_dir: Option<PathBuf>,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("CHAT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_dir = std::env::var("CHAT_DATA_DIR").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".chat-relay").join("conversations")
            },
            PathBuf::from,
        );

        let static_dir = std::env::var("CHAT_STATIC_DIR")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        Self {
            port,
            data_dir,
            static_dir,
            llm: LlmConfig::from_env(),
        }
    }
}
