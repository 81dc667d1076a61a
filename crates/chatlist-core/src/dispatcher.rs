//! Single-model request execution with bounded retry

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::DispatchError;
use crate::providers::AdapterRegistry;
use crate::types::{Completion, PromptMessages, ResolvedModel};

/// Per-call timeout for regular sends
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call timeout for prompt improvement, which produces longer answers
pub const DEFAULT_IMPROVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry settings for one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Wait before retry `n` (0-based) is `(n + 1) * backoff_step`
    pub backoff_step: Duration,
    /// Retry every failure kind. When false, non-transient errors end the loop early.
    pub retry_non_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_step: Duration::from_secs(2),
            retry_non_transient: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn with_retry_non_transient(mut self, retry: bool) -> Self {
        self.retry_non_transient = retry;
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * (attempt + 1)
    }
}

/// Drives one model's request through its adapter
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    adapters: Arc<AdapterRegistry>,
    policy: RetryPolicy,
}

impl RequestDispatcher {
    pub fn new(adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            adapters,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `messages` to `model`, retrying on failure.
    ///
    /// Makes at most `max_retries + 1` attempts and returns the first success,
    /// or the error of the last attempt.
    pub async fn dispatch(
        &self,
        model: &ResolvedModel,
        messages: &PromptMessages,
        timeout: Duration,
    ) -> Result<Completion, DispatchError> {
        let adapter = self
            .adapters
            .select(model.config.provider_kind)
            .ok_or_else(|| {
                DispatchError::Unexpected(format!(
                    "no adapter registered for provider '{}'",
                    model.config.provider_kind
                ))
            })?;

        let mut attempt: u32 = 0;
        loop {
            debug!(
                "Dispatching to {} via {} (attempt {}/{})",
                model.display_name(),
                adapter.provider_name(),
                attempt + 1,
                self.policy.max_retries + 1
            );

            let outcome = match tokio::time::timeout(
                timeout,
                adapter.complete(model, messages, timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout {
                    model: model.display_name().to_string(),
                }),
            };

            let err = match outcome {
                Ok(completion) => return Ok(completion),
                Err(err) => err,
            };

            let retryable = self.policy.retry_non_transient || err.is_transient();
            if attempt >= self.policy.max_retries || !retryable {
                error!(
                    "All attempts exhausted for {} after {} tries: {}",
                    model.display_name(),
                    attempt + 1,
                    err
                );
                return Err(err);
            }

            let wait = self.policy.delay_after(attempt);
            warn!(
                "Attempt {} for {} failed, retrying in {:?}: {}",
                attempt + 1,
                model.display_name(),
                wait,
                err
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::ProviderAdapter;
    use crate::types::{Credential, ModelConfig, ProviderKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a numbered error until `succeed_on` (1-based), then succeeds
    pub(crate) struct ScriptedAdapter {
        pub(crate) calls: AtomicU32,
        pub(crate) succeed_on: Option<u32>,
        pub(crate) rejected_status: Option<u16>,
    }

    impl ScriptedAdapter {
        pub(crate) fn always_failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on: None,
                rejected_status: None,
            }
        }

        pub(crate) fn succeeding_on(attempt: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on: Some(attempt),
                rejected_status: None,
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            model: &ResolvedModel,
            _messages: &PromptMessages,
            _timeout: Duration,
        ) -> Result<Completion, DispatchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.succeed_on.is_some_and(|n| call >= n) {
                return Ok(Completion {
                    response_text: format!("answer on attempt {}", call),
                    tokens_used: Some(3),
                    response_time: Duration::from_millis(1),
                });
            }
            if let Some(status) = self.rejected_status {
                return Err(DispatchError::ProviderRejected {
                    status,
                    message: format!("rejected #{}", call),
                    resolved_model: "x/y".to_string(),
                    display_name: model.display_name().to_string(),
                });
            }
            Err(DispatchError::Network {
                model: model.display_name().to_string(),
                message: format!("failure #{}", call),
            })
        }
    }

    pub(crate) fn test_model(id: i64, name: &str, kind: ProviderKind) -> ResolvedModel {
        ResolvedModel::new(
            ModelConfig {
                id,
                display_name: name.to_string(),
                provider_kind: kind,
                api_base_url: "http://localhost/v1/chat/completions".to_string(),
                credential_reference: "TEST_API_KEY".to_string(),
                is_active: true,
            },
            Some(Credential::new("test-key")),
        )
    }

    fn dispatcher_with(adapter: Arc<ScriptedAdapter>, policy: RetryPolicy) -> RequestDispatcher {
        let mut registry = AdapterRegistry::new();
        registry.register(ProviderKind::OpenAi, adapter);
        RequestDispatcher::new(Arc::new(registry)).with_policy(policy)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_backoff_step(Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert!(policy.retry_non_transient);
        assert_eq!(policy.delay_after(0), Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_always_failing_makes_three_attempts_and_returns_last_error() {
        let adapter = Arc::new(ScriptedAdapter::always_failing());
        let dispatcher = dispatcher_with(adapter.clone(), fast_policy());

        let err = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::OpenAi),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, DispatchError::Network { ref message, .. } if message == "failure #3"));
    }

    #[tokio::test]
    async fn test_success_stops_retrying() {
        let adapter = Arc::new(ScriptedAdapter::succeeding_on(2));
        let dispatcher = dispatcher_with(adapter.clone(), fast_policy());

        let completion = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::OpenAi),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(completion.response_text, "answer on attempt 2");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let adapter = Arc::new(ScriptedAdapter::always_failing());
        let dispatcher = dispatcher_with(adapter.clone(), fast_policy().with_max_retries(0));

        let result = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::OpenAi),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejections_are_retried_by_default() {
        let adapter = Arc::new(ScriptedAdapter {
            rejected_status: Some(400),
            ..ScriptedAdapter::always_failing()
        });
        let dispatcher = dispatcher_with(adapter.clone(), fast_policy());

        let err = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::OpenAi),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, DispatchError::ProviderRejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_non_transient_short_circuit_when_opted_in() {
        let adapter = Arc::new(ScriptedAdapter {
            rejected_status: Some(400),
            ..ScriptedAdapter::always_failing()
        });
        let dispatcher =
            dispatcher_with(adapter.clone(), fast_policy().with_retry_non_transient(false));

        let result = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::OpenAi),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_uses_openai_adapter() {
        let adapter = Arc::new(ScriptedAdapter::succeeding_on(1));
        let dispatcher = dispatcher_with(adapter.clone(), fast_policy());

        let completion = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::Unknown),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(completion.response_text, "answer on attempt 1");
    }

    #[tokio::test]
    async fn test_hanging_adapter_is_bounded_by_timeout() {
        struct Hanging;

        #[async_trait]
        impl ProviderAdapter for Hanging {
            fn provider_name(&self) -> &str {
                "hanging"
            }

            async fn complete(
                &self,
                _model: &ResolvedModel,
                _messages: &PromptMessages,
                _timeout: Duration,
            ) -> Result<Completion, DispatchError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DispatchError::Unexpected("unreachable".to_string()))
            }
        }

        let mut registry = AdapterRegistry::new();
        registry.register(ProviderKind::OpenAi, Arc::new(Hanging));
        let dispatcher =
            RequestDispatcher::new(Arc::new(registry)).with_policy(fast_policy().with_max_retries(1));

        let err = dispatcher
            .dispatch(
                &test_model(1, "slow", ProviderKind::OpenAi),
                &PromptMessages::user("hi"),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { ref model } if model == "slow"));
    }

    #[tokio::test]
    async fn test_missing_adapter_is_unexpected() {
        let dispatcher = RequestDispatcher::new(Arc::new(AdapterRegistry::new()));
        let err = dispatcher
            .dispatch(
                &test_model(1, "m", ProviderKind::Groq),
                &PromptMessages::user("hi"),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnexpectedError);
    }
}
