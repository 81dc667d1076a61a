//! Concurrent multi-model dispatch
//!
//! One task per model, bounded by a semaphore. Every model yields exactly one
//! [`DispatchResult`], whatever happens inside its dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{DEFAULT_SEND_TIMEOUT, RequestDispatcher};
use crate::error::ErrorKind;
use crate::types::{DispatchResult, PromptMessages, PromptRequest, ResolvedModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutConfig {
    /// In-flight dispatches at any moment
    pub max_concurrency: usize,
    /// Per-call timeout handed to every dispatch
    pub timeout: Duration,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FanOutCoordinator {
    dispatcher: RequestDispatcher,
    config: FanOutConfig,
}

impl FanOutCoordinator {
    pub fn new(dispatcher: RequestDispatcher, config: FanOutConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &FanOutConfig {
        &self.config
    }

    /// Send `prompt` to every model and collect the results in completion order
    pub async fn run(&self, models: Vec<ResolvedModel>, prompt: &PromptRequest) -> Vec<DispatchResult> {
        self.run_with_progress(models, prompt, None).await
    }

    /// Like [`run`](Self::run), also forwarding each result to `progress` as it lands.
    ///
    /// Progress is best-effort: a full or closed channel drops the update and
    /// never holds up the batch. The returned results are always complete.
    pub async fn run_with_progress(
        &self,
        models: Vec<ResolvedModel>,
        prompt: &PromptRequest,
        progress: Option<mpsc::Sender<DispatchResult>>,
    ) -> Vec<DispatchResult> {
        let total = models.len();
        if total == 0 {
            return Vec::new();
        }
        info!(
            "Sending prompt to {} model(s), max {} concurrent",
            total, self.config.max_concurrency
        );

        // Identity of every model, so a lost task can still be reported
        let expected: Vec<(i64, String)> = models
            .iter()
            .map(|m| (m.id(), m.display_name().to_string()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let messages = Arc::new(PromptMessages::user(prompt.text.clone()));
        let mut tasks = JoinSet::new();

        for (index, model) in models.into_iter().enumerate() {
            let sem = semaphore.clone();
            let dispatcher = self.dispatcher.clone();
            let messages = messages.clone();
            let timeout = self.config.timeout;
            tasks.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (
                            index,
                            DispatchResult::failure_with(
                                model.id(),
                                model.display_name(),
                                ErrorKind::UnexpectedError,
                                format!("Concurrency limiter closed: {}", e),
                            ),
                        );
                    }
                };
                (index, Self::run_one(dispatcher, model, messages, timeout).await)
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut reported = vec![false; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    reported[index] = true;
                    if !result.is_success() {
                        error!(
                            "{} failed: {}",
                            result.model_display_name(),
                            result.error_message().unwrap_or_default()
                        );
                    }
                    if let Some(tx) = &progress {
                        forward_progress(tx, &result);
                    }
                    results.push(result);
                }
                Err(e) => warn!("Fan-out task failed: {}", e),
            }
        }

        for (index, (id, name)) in expected.iter().enumerate() {
            if reported[index] {
                continue;
            }
            let result = DispatchResult::failure_with(
                *id,
                name,
                ErrorKind::UnexpectedError,
                "Dispatch task ended without a result".to_string(),
            );
            if let Some(tx) = &progress {
                forward_progress(tx, &result);
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            "Fan-out complete: {} succeeded, {} failed",
            succeeded,
            results.len() - succeeded
        );
        results
    }

    /// One model's dispatch, run in its own task so a panic stays contained
    async fn run_one(
        dispatcher: RequestDispatcher,
        model: ResolvedModel,
        messages: Arc<PromptMessages>,
        timeout: Duration,
    ) -> DispatchResult {
        let id = model.id();
        let name = model.display_name().to_string();
        let config = model.config.clone();

        let handle = tokio::spawn(async move {
            dispatcher.dispatch(&model, &messages, timeout).await
        });

        match handle.await {
            Ok(Ok(completion)) => DispatchResult::success(&config, completion),
            Ok(Err(err)) => DispatchResult::failure(&config, &err),
            Err(e) => DispatchResult::failure_with(
                id,
                &name,
                ErrorKind::UnexpectedError,
                format!("Task panicked: {}", e),
            ),
        }
    }
}

/// Non-blocking send of one progress update
fn forward_progress(tx: &mpsc::Sender<DispatchResult>, result: &DispatchResult) {
    match tx.try_send(result.clone()) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => warn!(
            "Progress channel full, dropping update for {}",
            result.model_display_name()
        ),
        Err(mpsc::error::TrySendError::Closed(_)) => debug!("Progress receiver dropped"),
    }
}
