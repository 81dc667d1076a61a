//! OpenAI chat-completions adapter
//!
//! Also hosts the wire code reused by the compatible and aggregator adapters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::resolver::ModelNameResolver;
use crate::types::{ChatMessage, Completion, Credential, PromptMessages, ProviderKind, ResolvedModel};

use super::ProviderAdapter;

/// Sampling temperature sent with every request
pub const TEMPERATURE: f32 = 0.7;

/// How much of an unparseable error body is surfaced
const ERROR_SNIPPET_CHARS: usize = 200;

/// OpenAI adapter; the building block for every other adapter
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: Client,
    resolver: Arc<ModelNameResolver>,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

impl OpenAiAdapter {
    pub fn new(client: Client, resolver: Arc<ModelNameResolver>) -> Self {
        Self { client, resolver }
    }

    pub fn resolver(&self) -> &ModelNameResolver {
        &self.resolver
    }

    /// Run a chat-completions call, resolving the model name as `kind` expects
    pub(crate) async fn complete_as(
        &self,
        kind: ProviderKind,
        extra_headers: &[(&'static str, String)],
        model: &ResolvedModel,
        messages: &PromptMessages,
        timeout: Duration,
    ) -> Result<Completion, DispatchError> {
        let credential = require_credential(model)?;
        let resolved_model = self.resolver.resolve(model.display_name(), Some(kind));
        let url = endpoint_url(&model.config.api_base_url);
        let body = build_body(&resolved_model, messages);

        debug!(
            "{} request: model={} ({}), messages={}",
            kind,
            resolved_model,
            model.display_name(),
            body.messages.len()
        );

        let started = Instant::now();
        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .header("Content-Type", "application/json");
        for (name, value) in extra_headers {
            request = request.header(*name, value);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(model.display_name(), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(model.display_name(), e))?;

        if !status.is_success() {
            return Err(rejection_error(
                status,
                &text,
                &resolved_model,
                model.display_name(),
            ));
        }

        let (response_text, tokens_used) = parse_success_body(model.display_name(), &text)?;
        let response_time = started.elapsed();

        info!(
            model = %model.display_name(),
            elapsed_secs = response_time.as_secs_f64(),
            "Request to {} completed in {:.2}s",
            model.display_name(),
            response_time.as_secs_f64()
        );

        Ok(Completion {
            response_text,
            tokens_used,
            response_time,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        model: &ResolvedModel,
        messages: &PromptMessages,
        timeout: Duration,
    ) -> Result<Completion, DispatchError> {
        self.complete_as(ProviderKind::OpenAi, &[], model, messages, timeout)
            .await
    }
}

/// Fail fast, before any I/O, when no secret was resolved
pub(crate) fn require_credential(model: &ResolvedModel) -> Result<&Credential, DispatchError> {
    model
        .credential
        .as_ref()
        .filter(|c| !c.expose().trim().is_empty())
        .ok_or_else(|| DispatchError::CredentialMissing {
            model: model.display_name().to_string(),
            source_name: model.credential_source.clone(),
        })
}

/// Accept either a full `.../chat/completions` URL or an API root
pub(crate) fn endpoint_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{}/chat/completions", trimmed)
    }
}

pub(crate) fn build_body(resolved_model: &str, messages: &PromptMessages) -> ChatCompletionBody {
    ChatCompletionBody {
        model: resolved_model.to_string(),
        messages: messages.to_messages(),
        temperature: TEMPERATURE,
    }
}

fn transport_error(model: &str, e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout {
            model: model.to_string(),
        }
    } else {
        DispatchError::Network {
            model: model.to_string(),
            message: e.to_string(),
        }
    }
}

/// Extract `choices[0].message.content` and best-effort `usage.total_tokens`
pub(crate) fn parse_success_body(
    model: &str,
    body: &str,
) -> Result<(String, Option<u64>), DispatchError> {
    let malformed = |detail: String| DispatchError::MalformedResponse {
        model: model.to_string(),
        detail,
    };

    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| malformed("response has no choices[0].message.content".to_string()))?;

    let tokens_used = parsed
        .usage
        .as_ref()
        .and_then(|usage| usage.get("total_tokens"))
        .and_then(Value::as_u64);

    Ok((content, tokens_used))
}

/// Map a non-2xx answer to `ProviderRejected`, keeping enough context to diagnose
/// retired or mistyped model ids
pub(crate) fn rejection_error(
    status: StatusCode,
    body: &str,
    resolved_model: &str,
    display_name: &str,
) -> DispatchError {
    let message = extract_error_message(body).unwrap_or_else(|| snippet(body));
    DispatchError::ProviderRejected {
        status: status.as_u16(),
        message,
        resolved_model: resolved_model.to_string(),
        display_name: display_name.to_string(),
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error");
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty body)".to_string();
    }
    let mut out: String = trimmed.chars().take(ERROR_SNIPPET_CHARS).collect();
    if trimmed.chars().count() > ERROR_SNIPPET_CHARS {
        out.push_str("...");
    }
    out
}

// ── Wire types ──

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionBody {
    pub(crate) model: String,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    #[serde(default)]
    message: Option<ChatCompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}
