//! OpenRouter aggregator adapter
//!
//! Resolves display names to `provider/model` ids and sends the
//! application-identifying headers OpenRouter requires.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::types::{Completion, PromptMessages, ProviderKind, ResolvedModel};

use super::openai::OpenAiAdapter;
use super::ProviderAdapter;

/// Values for the `HTTP-Referer` and `X-Title` headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRouterHeaders {
    pub referer: String,
    pub title: String,
}

impl Default for OpenRouterHeaders {
    fn default() -> Self {
        Self {
            referer: "https://github.com/chatlist".to_string(),
            title: "ChatList".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    inner: OpenAiAdapter,
    headers: OpenRouterHeaders,
}

impl OpenRouterAdapter {
    pub fn new(inner: OpenAiAdapter, headers: OpenRouterHeaders) -> Self {
        Self { inner, headers }
    }

    fn extra_headers(&self) -> [(&'static str, String); 2] {
        [
            ("HTTP-Referer", self.headers.referer.clone()),
            ("X-Title", self.headers.title.clone()),
        ]
    }
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    fn provider_name(&self) -> &str {
        "openrouter"
    }

    async fn complete(
        &self,
        model: &ResolvedModel,
        messages: &PromptMessages,
        timeout: Duration,
    ) -> Result<Completion, DispatchError> {
        let headers = self.extra_headers();
        self.inner
            .complete_as(ProviderKind::OpenRouter, &headers, model, messages, timeout)
            .await
    }
}
