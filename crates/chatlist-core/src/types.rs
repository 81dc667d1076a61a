//! Provider-agnostic types shared by the dispatcher, the fan-out coordinator
//! and the prompt improver

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, ErrorKind, ValidationError};

/// Closed set of provider families a model config can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Groq,
    OpenRouter,
    #[default]
    Unknown,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
            Self::Unknown => "unknown",
        }
    }

    /// Guess the provider family from its endpoint host
    pub fn from_url(api_url: &str) -> Self {
        let lower = api_url.to_lowercase();
        if lower.contains("openai.com") {
            Self::OpenAi
        } else if lower.contains("deepseek.com") {
            Self::DeepSeek
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openrouter.ai") || lower.contains("openrouter.com") {
            Self::OpenRouter
        } else {
            Self::Unknown
        }
    }

    /// Prefer an explicit kind; otherwise detect it from the URL
    pub fn normalize(explicit: Option<&str>, api_url: Option<&str>) -> Self {
        if let Some(kind) = explicit.filter(|k| !k.trim().is_empty()) {
            return kind.parse().unwrap_or(Self::Unknown);
        }
        api_url.map(Self::from_url).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "deepseek" => Self::DeepSeek,
            "groq" => Self::Groq,
            "openrouter" => Self::OpenRouter,
            _ => Self::Unknown,
        })
    }
}

/// A user-managed model entry. Holds the *name* of the credential variable, never its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: i64,
    pub display_name: String,
    pub provider_kind: ProviderKind,
    pub api_base_url: String,
    pub credential_reference: String,
    pub is_active: bool,
}

impl ModelConfig {
    /// Check the user-editable fields: non-empty name and an http(s) URL
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_model_fields(&self.display_name, &self.api_base_url)
    }
}

pub fn validate_model_fields(name: &str, api_url: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let parsed = url::Url::parse(api_url.trim()).map_err(|e| ValidationError::InvalidUrl {
        url: api_url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::InvalidUrl {
            url: api_url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Secret value resolved from the environment. Debug output is masked.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", mask_secret(&self.0))
    }
}

/// Mask a secret for Debug output: first 3 and last 4 chars for long keys, otherwise "***"
pub(crate) fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// Read-only snapshot of a model config with its credential attached.
/// Taken before a fan-out starts and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub config: ModelConfig,
    pub credential: Option<Credential>,
    /// Variable the credential was looked up in
    pub credential_source: String,
}

impl ResolvedModel {
    pub fn new(config: ModelConfig, credential: Option<Credential>) -> Self {
        let credential_source = config.credential_reference.clone();
        Self {
            config,
            credential,
            credential_source,
        }
    }

    pub fn with_credential_source(mut self, source: impl Into<String>) -> Self {
        self.credential_source = source.into();
        self
    }

    pub fn id(&self) -> i64 {
        self.config.id
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }
}

/// A prompt as typed by the user, before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl PromptRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }
}

/// Message role on the chat-completions wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Either a single user message or a system + user pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessages {
    pub system: Option<String>,
    pub user: String,
}

impl PromptMessages {
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
        }
    }

    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(self.user.clone()));
        messages
    }
}

/// Normalized successful answer from one adapter call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub response_text: String,
    pub tokens_used: Option<u64>,
    pub response_time: Duration,
}

/// Outcome of one model's dispatch inside a fan-out.
///
/// Fields are private so that `success` always agrees with exactly one of
/// `response_text` / `error_message`; deserialization enforces the same rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDispatchResult")]
pub struct DispatchResult {
    model_id: i64,
    model_display_name: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    tokens_used: Option<u64>,
    response_time_seconds: Option<f64>,
}

impl DispatchResult {
    pub fn success(model: &ModelConfig, completion: Completion) -> Self {
        Self {
            model_id: model.id,
            model_display_name: model.display_name.clone(),
            success: true,
            response_text: Some(completion.response_text),
            error_kind: None,
            error_message: None,
            tokens_used: completion.tokens_used,
            response_time_seconds: Some(completion.response_time.as_secs_f64()),
        }
    }

    pub fn failure(model: &ModelConfig, error: &DispatchError) -> Self {
        Self::failure_with(model.id, &model.display_name, error.kind(), error.to_string())
    }

    pub fn failure_with(
        model_id: i64,
        model_display_name: &str,
        error_kind: ErrorKind,
        error_message: String,
    ) -> Self {
        Self {
            model_id,
            model_display_name: model_display_name.to_string(),
            success: false,
            response_text: None,
            error_kind: Some(error_kind),
            error_message: Some(error_message),
            tokens_used: None,
            response_time_seconds: None,
        }
    }

    pub fn model_id(&self) -> i64 {
        self.model_id
    }

    pub fn model_display_name(&self) -> &str {
        &self.model_display_name
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn response_text(&self) -> Option<&str> {
        self.response_text.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn tokens_used(&self) -> Option<u64> {
        self.tokens_used
    }

    pub fn response_time_seconds(&self) -> Option<f64> {
        self.response_time_seconds
    }
}

#[derive(Deserialize)]
struct RawDispatchResult {
    model_id: i64,
    model_display_name: String,
    success: bool,
    #[serde(default)]
    response_text: Option<String>,
    #[serde(default)]
    error_kind: Option<ErrorKind>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    tokens_used: Option<u64>,
    #[serde(default)]
    response_time_seconds: Option<f64>,
}

impl TryFrom<RawDispatchResult> for DispatchResult {
    type Error = String;

    fn try_from(raw: RawDispatchResult) -> Result<Self, Self::Error> {
        let consistent = match (raw.success, &raw.response_text, &raw.error_message) {
            (true, Some(_), None) => true,
            (false, None, Some(_)) => raw.error_kind.is_some(),
            _ => false,
        };
        if !consistent {
            return Err(format!(
                "inconsistent dispatch result for model {}: success={} requires exactly one of response_text/error_message",
                raw.model_id, raw.success
            ));
        }
        Ok(Self {
            model_id: raw.model_id,
            model_display_name: raw.model_display_name,
            success: raw.success,
            response_text: raw.response_text,
            error_kind: raw.error_kind,
            error_message: raw.error_message,
            tokens_used: raw.tokens_used,
            response_time_seconds: raw.response_time_seconds,
        })
    }
}

/// Sort results by model id; fan-out returns them in completion order
pub fn sort_by_model_id(results: &mut [DispatchResult]) {
    results.sort_by_key(|r| r.model_id);
}

/// A fan-out batch in the shape used for JSON export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchBatch {
    pub exported_at: DateTime<Utc>,
    pub prompt: PromptRequest,
    pub results: Vec<DispatchResult>,
}

impl DispatchBatch {
    pub fn new(prompt: PromptRequest, results: Vec<DispatchResult>) -> Self {
        Self {
            exported_at: Utc::now(),
            prompt,
            results,
        }
    }
}

/// Focus of a prompt improvement request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementCategory {
    Code,
    Analysis,
    Creative,
    #[default]
    General,
}

impl ImprovementCategory {
    /// Parse a category name; unknown names yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "code" => Some(Self::Code),
            "analysis" => Some(Self::Analysis),
            "creative" => Some(Self::Creative),
            "general" | "" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for ImprovementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Analysis => write!(f, "analysis"),
            Self::Creative => write!(f, "creative"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Improved prompt plus up to three alternative phrasings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementResult {
    pub improved_text: String,
    pub alternatives: Vec<String>,
}
