//! Centralized model definitions
//!
//! The set of selectable models is closed; each maps to exactly one backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend family that serves a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Hosted OpenAI-compatible API
    Hosted,
    /// Locally served model
    Local,
}

impl Backend {
    pub fn display_name(self) -> &'static str {
        match self {
            Backend::Hosted => "OpenAI",
            Backend::Local => "Local",
        }
    }
}

/// Which model a request asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSelector {
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "local-llama")]
    LocalLlama,
    #[serde(rename = "local-mistral")]
    LocalMistral,
}

impl ModelSelector {
    pub const ALL: [ModelSelector; 4] = [
        ModelSelector::Gpt35Turbo,
        ModelSelector::Gpt4,
        ModelSelector::LocalLlama,
        ModelSelector::LocalMistral,
    ];

    pub fn def(self) -> &'static ModelDef {
        match self {
            ModelSelector::Gpt35Turbo => &MODELS[0],
            ModelSelector::Gpt4 => &MODELS[1],
            ModelSelector::LocalLlama => &MODELS[2],
            ModelSelector::LocalMistral => &MODELS[3],
        }
    }

    pub fn id(self) -> &'static str {
        self.def().id
    }

    pub fn backend(self) -> Backend {
        self.def().backend
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelSelector::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| format!("Unknown model: {s}"))
    }
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "gpt-4")
    pub id: &'static str,
    pub name: &'static str,
    pub backend: Backend,
    /// Name sent to the backend
    pub api_name: &'static str,
    pub description: &'static str,
}

static MODELS: [ModelDef; 4] = [
    ModelDef {
        id: "gpt-3.5-turbo",
        name: "GPT-3.5 Turbo",
        backend: Backend::Hosted,
        api_name: "gpt-3.5-turbo",
        description: "Fast hosted model",
    },
    ModelDef {
        id: "gpt-4",
        name: "GPT-4",
        backend: Backend::Hosted,
        api_name: "gpt-4",
        description: "Most capable hosted model",
    },
    ModelDef {
        id: "local-llama",
        name: "Local LLaMA",
        backend: Backend::Local,
        api_name: "llama",
        description: "LLaMA served from the local model endpoint",
    },
    ModelDef {
        id: "local-mistral",
        name: "Local Mistral",
        backend: Backend::Local,
        api_name: "mistral",
        description: "Mistral served from the local model endpoint",
    },
];

/// All model definitions, in display order
pub fn all_models() -> &'static [ModelDef] {
    &MODELS
}
