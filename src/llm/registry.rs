//! Provider registry and fallback-chain resolution

use super::{
    all_models, Backend, ChatProvider, GenerateOptions, LocalModelService, LoggingProvider,
    ModelSelector, OpenAIService, RuleBasedProvider,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Local tier tried after a hosted model fails
const LOCAL_FALLBACK: ModelSelector = ModelSelector::LocalLlama;

/// Configuration for provider backends
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    /// Override for the hosted API base (e.g. a proxy), without `/chat/completions`
    pub openai_base_url: Option<String>,
    /// Base URL of the local model server
    pub local_model_url: Option<String>,
    pub timeout: Duration,
    pub default_model: Option<String>,
    /// Reply length cap; each backend has its own default when unset
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: None,
            local_model_url: None,
            timeout: DEFAULT_TIMEOUT,
            default_model: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            local_model_url: non_empty("LOCAL_MODEL_URL"),
            timeout: non_empty("LLM_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            default_model: non_empty("DEFAULT_MODEL"),
            max_tokens: non_empty("LLM_MAX_TOKENS").and_then(|s| s.parse().ok()),
            temperature: non_empty("LLM_TEMPERATURE").and_then(|s| s.parse().ok()),
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Registry of configured backends
pub struct ProviderRegistry {
    services: HashMap<ModelSelector, Arc<dyn ChatProvider>>,
    /// Last tier, always present
    fallback: Arc<dyn ChatProvider>,
    default_model: ModelSelector,
    options: GenerateOptions,
}

impl ProviderRegistry {
    /// Registry with no model backends; every chain ends at canned replies
    pub fn empty() -> Self {
        Self {
            services: HashMap::new(),
            fallback: Arc::new(RuleBasedProvider),
            default_model: ModelSelector::default(),
            options: GenerateOptions::default(),
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut registry = Self::empty();
        registry.options = config.generate_options();

        for selector in ModelSelector::ALL {
            if let Some(service) = Self::try_create(selector, config) {
                registry.services.insert(selector, service);
            }
        }

        if let Some(id) = &config.default_model {
            match id.parse() {
                Ok(selector) => registry.default_model = selector,
                Err(e) => tracing::warn!(error = %e, "Ignoring DEFAULT_MODEL"),
            }
        }

        registry
    }

    /// Build a backend if its prerequisites are configured
    fn try_create(selector: ModelSelector, config: &LlmConfig) -> Option<Arc<dyn ChatProvider>> {
        let created = match selector.backend() {
            Backend::Hosted => {
                let api_key = config.openai_api_key.clone()?;
                OpenAIService::new(api_key, selector, config.openai_base_url.as_deref(), config.timeout)
                    .map(|s| Arc::new(s) as Arc<dyn ChatProvider>)
            }
            Backend::Local => {
                let url = config.local_model_url.as_deref()?;
                LocalModelService::new(url, selector, config.timeout)
                    .map(|s| Arc::new(s) as Arc<dyn ChatProvider>)
            }
        };

        match created {
            Ok(service) => Some(Arc::new(LoggingProvider::new(service)) as Arc<dyn ChatProvider>),
            Err(e) => {
                tracing::warn!(model = %selector, error = %e, "Failed to create provider");
                None
            }
        }
    }

    /// Register (or replace) the backend for a model
    #[cfg(test)]
    #[must_use]
    pub fn with_provider(mut self, selector: ModelSelector, provider: Arc<dyn ChatProvider>) -> Self {
        self.services.insert(selector, provider);
        self
    }

    /// Replace the last-resort tier
    #[cfg(test)]
    #[must_use]
    pub fn with_fallback(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.fallback = provider;
        self
    }

    /// Override generation settings
    #[cfg(test)]
    #[must_use]
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Generation settings passed to every backend
    pub fn generate_options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn get(&self, selector: ModelSelector) -> Option<Arc<dyn ChatProvider>> {
        self.services.get(&selector).cloned()
    }

    pub fn is_available(&self, selector: ModelSelector) -> bool {
        self.services.contains_key(&selector)
    }

    pub fn default_model(&self) -> ModelSelector {
        self.default_model
    }

    /// Providers to try, in order, for a request on `selector`.
    ///
    /// Hosted models fall back to the local model, and every chain ends with
    /// canned replies. Unconfigured tiers are left out.
    pub fn fallback_chain(&self, selector: ModelSelector) -> Vec<Arc<dyn ChatProvider>> {
        let mut chain = Vec::with_capacity(3);

        match self.get(selector) {
            Some(provider) => chain.push(provider),
            None => tracing::debug!(model = %selector, "Requested model not configured"),
        }

        if selector.backend() == Backend::Hosted {
            if let Some(local) = self.get(LOCAL_FALLBACK) {
                chain.push(local);
            }
        }

        chain.push(Arc::clone(&self.fallback));
        chain
    }

    /// Model catalog with availability
    pub fn available_model_info(&self) -> Vec<crate::api::ModelInfo> {
        all_models()
            .iter()
            .filter_map(|def| {
                let selector: ModelSelector = def.id.parse().ok()?;
                Some(crate::api::ModelInfo {
                    id: def.id.to_string(),
                    name: def.name.to_string(),
                    provider: def.backend.display_name().to_string(),
                    description: def.description.to_string(),
                    available: self.is_available(selector),
                })
            })
            .collect()
    }

    pub fn has_hosted(&self) -> bool {
        self.services.keys().any(|s| s.backend() == Backend::Hosted)
    }

    pub fn has_local(&self) -> bool {
        self.services.keys().any(|s| s.backend() == Backend::Local)
    }
}
