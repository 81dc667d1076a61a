//! Provider adapters
//!
//! Every supported provider speaks the chat-completions wire format; the
//! adapters differ in how the `model` field is resolved and which headers are
//! sent. [`AdapterRegistry`] is the lookup table from [`ProviderKind`] to the
//! adapter that handles it.

pub mod openai;
pub mod openai_compat;
pub mod openrouter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::error::DispatchError;
use crate::resolver::ModelNameResolver;
use crate::types::{Completion, PromptMessages, ProviderKind, ResolvedModel};

pub use openai::OpenAiAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use openrouter::{OpenRouterAdapter, OpenRouterHeaders};

/// Uniform call contract shared by all provider families
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable provider name (e.g. "openai", "openrouter")
    fn provider_name(&self) -> &str;

    /// Send one request and normalize the answer.
    ///
    /// Implementations must fail with [`DispatchError::CredentialMissing`]
    /// before doing any I/O when `model.credential` is absent.
    async fn complete(
        &self,
        model: &ResolvedModel,
        messages: &PromptMessages,
        timeout: Duration,
    ) -> Result<Completion, DispatchError>;
}

/// Lookup table from provider kind to adapter
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.adapters.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("AdapterRegistry").field("kinds", &kinds).finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in provider families
    pub fn standard(
        client: Client,
        resolver: Arc<ModelNameResolver>,
        openrouter_headers: OpenRouterHeaders,
    ) -> Self {
        let openai = OpenAiAdapter::new(client, resolver);
        let mut registry = Self::new();
        registry.register(ProviderKind::OpenAi, Arc::new(openai.clone()));
        registry.register(
            ProviderKind::DeepSeek,
            Arc::new(OpenAiCompatAdapter::new("deepseek", ProviderKind::DeepSeek, openai.clone())),
        );
        registry.register(
            ProviderKind::Groq,
            Arc::new(OpenAiCompatAdapter::new("groq", ProviderKind::Groq, openai.clone())),
        );
        registry.register(
            ProviderKind::OpenRouter,
            Arc::new(OpenRouterAdapter::new(openai, openrouter_headers)),
        );
        registry
    }

    pub fn register(&mut self, kind: ProviderKind, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    /// Pick the adapter for `kind`, falling back to the OpenAI-compatible one
    pub fn select(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        if let Some(adapter) = self.adapters.get(&kind) {
            if kind != ProviderKind::Unknown {
                return Some(adapter.clone());
            }
        }
        warn!(
            "No adapter for model type '{}', trying the OpenAI-compatible format",
            kind
        );
        self.adapters.get(&ProviderKind::OpenAi).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedAdapter(&'static str);

    #[async_trait]
    impl ProviderAdapter for NamedAdapter {
        fn provider_name(&self) -> &str {
            self.0
        }

        async fn complete(
            &self,
            _model: &ResolvedModel,
            _messages: &PromptMessages,
            _timeout: Duration,
        ) -> Result<Completion, DispatchError> {
            Err(DispatchError::Unexpected("not used".to_string()))
        }
    }

    #[test]
    fn test_standard_registry_covers_all_kinds() {
        let registry = AdapterRegistry::standard(
            Client::new(),
            Arc::new(ModelNameResolver::builtin()),
            OpenRouterHeaders::default(),
        );
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.select(ProviderKind::OpenAi).unwrap().provider_name(), "openai");
        assert_eq!(registry.select(ProviderKind::DeepSeek).unwrap().provider_name(), "deepseek");
        assert_eq!(registry.select(ProviderKind::Groq).unwrap().provider_name(), "groq");
        assert_eq!(
            registry.select(ProviderKind::OpenRouter).unwrap().provider_name(),
            "openrouter"
        );
    }

    #[test]
    fn test_unknown_kind_falls_back_to_openai() {
        let mut registry = AdapterRegistry::new();
        registry.register(ProviderKind::OpenAi, Arc::new(NamedAdapter("compat")));
        registry.register(ProviderKind::Unknown, Arc::new(NamedAdapter("ignored")));
        assert_eq!(registry.select(ProviderKind::Unknown).unwrap().provider_name(), "compat");
        assert_eq!(registry.select(ProviderKind::Groq).unwrap().provider_name(), "compat");
    }

    #[test]
    fn test_empty_registry_selects_nothing() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.select(ProviderKind::OpenAi).is_none());
    }
}
