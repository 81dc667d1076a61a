//! chatlist-core - multi-provider prompt fan-out
//!
//! This crate provides:
//! - Provider adapters for OpenAI-compatible APIs, DeepSeek, Groq and OpenRouter
//! - Model display-name resolution driven by a reloadable alias table
//! - Single-model dispatch with bounded retry and concurrent fan-out
//! - Prompt improvement with JSON-first response parsing

pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod improver;
pub mod providers;
pub mod resolver;
pub mod types;

// Re-export main types for convenience
pub use credentials::{CredentialResolver, CredentialSource, EnvSource, MapSource};
pub use dispatcher::{DEFAULT_IMPROVE_TIMEOUT, DEFAULT_SEND_TIMEOUT, RequestDispatcher, RetryPolicy};
pub use error::{DispatchError, ErrorKind, ImproveError, ResolverError, ValidationError};
pub use fanout::{FanOutConfig, FanOutCoordinator};
pub use improver::{PromptImprover, category_or_general};
pub use providers::{AdapterRegistry, OpenRouterHeaders, ProviderAdapter};
pub use resolver::{AliasTable, ModelNameResolver};
pub use types::{
    ChatMessage, ChatRole, Completion, Credential, DispatchBatch, DispatchResult,
    ImprovementCategory, ImprovementResult, ModelConfig, PromptMessages, PromptRequest,
    ProviderKind, ResolvedModel, sort_by_model_id, validate_model_fields,
};
