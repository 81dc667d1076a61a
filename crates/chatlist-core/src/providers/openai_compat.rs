//! Direct providers that reuse the OpenAI wire format (DeepSeek, Groq)
//!
//! Only the model-name resolution differs: each provider gets the literal
//! model string its own API expects.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::types::{Completion, PromptMessages, ProviderKind, ResolvedModel};

use super::openai::OpenAiAdapter;
use super::ProviderAdapter;

/// OpenAI-compatible adapter, wraps [`OpenAiAdapter`] with a provider name and kind
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    inner: OpenAiAdapter,
    name: String,
    kind: ProviderKind,
}

impl OpenAiCompatAdapter {
    /// - `name`: label used in logs (e.g. "deepseek", "groq")
    /// - `kind`: selects the direct-provider rules of the resolver table
    pub fn new(name: impl Into<String>, kind: ProviderKind, inner: OpenAiAdapter) -> Self {
        Self {
            inner,
            name: name.into(),
            kind,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        model: &ResolvedModel,
        messages: &PromptMessages,
        timeout: Duration,
    ) -> Result<Completion, DispatchError> {
        self.inner
            .complete_as(self.kind, &[], model, messages, timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::openai::tests::model_for;
    use crate::resolver::ModelNameResolver;
    use reqwest::Client;
    use std::sync::Arc;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    fn compat(name: &str, kind: ProviderKind) -> OpenAiCompatAdapter {
        OpenAiCompatAdapter::new(
            name,
            kind,
            OpenAiAdapter::new(Client::new(), Arc::new(ModelNameResolver::builtin())),
        )
    }

    #[test]
    fn test_compat_adapter_name() {
        let adapter = compat("groq", ProviderKind::Groq);
        assert_eq!(adapter.provider_name(), "groq");
        assert_eq!(adapter.kind(), ProviderKind::Groq);
    }

    #[tokio::test]
    async fn test_deepseek_sends_literal_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "deepseek-chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = model_for(&server, "DeepSeek Chat", ProviderKind::DeepSeek);
        let completion = compat("deepseek", ProviderKind::DeepSeek)
            .complete(&model, &PromptMessages::user("hi"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(completion.response_text, "ok");
    }

    #[tokio::test]
    async fn test_groq_maps_mixtral() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "mixtral-8x7b-32768"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}],
                "usage": {"total_tokens": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = model_for(&server, "Groq Mixtral", ProviderKind::Groq);
        let completion = compat("groq", ProviderKind::Groq)
            .complete(&model, &PromptMessages::user("hi"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(completion.tokens_used, Some(12));
    }
}
