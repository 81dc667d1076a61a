//! Prompt improvement through a single chosen model

pub mod parse;
pub mod templates;

use std::time::Duration;

use tracing::{error, info, warn};

use crate::dispatcher::{DEFAULT_IMPROVE_TIMEOUT, RequestDispatcher};
use crate::error::ImproveError;
use crate::providers::openai::require_credential;
use crate::types::{ImprovementCategory, ImprovementResult, PromptMessages, ResolvedModel};

pub use parse::{normalize_whitespace, parse_response};

/// Map a user-supplied category name, falling back to general for unknown names
pub fn category_or_general(name: Option<&str>) -> ImprovementCategory {
    match name {
        None => ImprovementCategory::General,
        Some(raw) => ImprovementCategory::parse(raw).unwrap_or_else(|| {
            warn!("Unknown improvement type '{}', using general improvement", raw);
            ImprovementCategory::General
        }),
    }
}

#[derive(Debug, Clone)]
pub struct PromptImprover {
    dispatcher: RequestDispatcher,
    timeout: Duration,
}

impl PromptImprover {
    pub fn new(dispatcher: RequestDispatcher) -> Self {
        Self {
            dispatcher,
            timeout: DEFAULT_IMPROVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask `model` for an improved version of `original` plus alternatives.
    ///
    /// Fails before any request when the prompt is blank or the model has no
    /// credential.
    pub async fn improve(
        &self,
        model: &ResolvedModel,
        original: &str,
        category: Option<ImprovementCategory>,
    ) -> Result<ImprovementResult, ImproveError> {
        if original.trim().is_empty() {
            return Err(ImproveError::EmptyPrompt);
        }
        require_credential(model)?;

        let category = category.unwrap_or_default();
        let messages = PromptMessages::with_system(
            templates::system_prompt(category),
            templates::user_prompt(original),
        );

        info!(
            "Requesting {} prompt improvement from {}",
            category,
            model.display_name()
        );
        let completion = self
            .dispatcher
            .dispatch(model, &messages, self.timeout)
            .await
            .map_err(|e| {
                error!("API error while improving prompt: {}", e);
                ImproveError::from(e)
            })?;

        if completion.response_text.trim().is_empty() {
            return Err(ImproveError::EmptyResponse);
        }

        let result = parse_response(&completion.response_text)?;
        info!(
            "Prompt improved with {} alternative(s)",
            result.alternatives.len()
        );
        Ok(result)
    }
}
