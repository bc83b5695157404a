//! Resilient page actions.
//!
//! Each action resolves its element through the cascade, performs the page
//! operation, and on an execution failure treats the winning selector as a
//! miss and re-runs the cascade without it.

use crate::backend::PageDriver;
use crate::resolution::{
    AttemptOutcome, ProbeOp, Resolution, ResolutionAttempt, ResolutionEngine, ResolveError,
    SelectorResolutionFailed,
};
use crate::store::PersistenceError;
use resilio_common::config::schema::ResilienceConfig;
use resilio_common::{DriverError, ElementHandle, Origin, SelectChoice};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Resolution(#[from] SelectorResolutionFailed),

    #[error("Action '{action_key}' failed after {} attempt(s): {cause}", attempts.len())]
    ExecutionFailed {
        action_key: String,
        cause: String,
        attempts: Vec<ResolutionAttempt>,
    },

    #[error("Action '{0}' was cancelled")]
    Cancelled(String),

    #[error("Failed to persist selector for '{action_key}': {source}")]
    Persistence {
        action_key: String,
        #[source]
        source: PersistenceError,
    },
}

impl ActionError {
    pub fn action_key(&self) -> &str {
        match self {
            ActionError::Resolution(failed) => &failed.action_key,
            ActionError::ExecutionFailed { action_key, .. }
            | ActionError::Persistence { action_key, .. } => action_key,
            ActionError::Cancelled(action_key) => action_key,
        }
    }

    /// Attempt trace, empty for cancellation and persistence failures.
    pub fn attempts(&self) -> &[ResolutionAttempt] {
        match self {
            ActionError::Resolution(failed) => &failed.attempts,
            ActionError::ExecutionFailed { attempts, .. } => attempts,
            ActionError::Cancelled(_) | ActionError::Persistence { .. } => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra cascade rounds after an execution failure.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    /// Delay before retry `round` (1-based): `backoff * 2^(round-1)`.
    pub fn delay_for(&self, round: u32) -> Duration {
        let exponent = round.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone)]
enum PageAction<'a> {
    Locate,
    Click,
    Fill(&'a str),
    Choose(&'a SelectChoice),
}

impl PageAction<'_> {
    fn probe_op(&self) -> ProbeOp {
        match self {
            PageAction::Locate => ProbeOp::Locate,
            _ => ProbeOp::Interact,
        }
    }

    async fn execute<P: PageDriver + ?Sized>(
        &self,
        page: &mut P,
        element: &ElementHandle,
    ) -> Result<(), DriverError> {
        match self {
            PageAction::Locate => Ok(()),
            PageAction::Click => page.click(element).await,
            PageAction::Fill(value) => page.fill(element, value).await,
            PageAction::Choose(choice) => match element.tag.as_str() {
                "select" => page.select_option(element, choice).await,
                // Autocomplete widgets take the text instead.
                "input" | "textarea" => page.fill(element, choice.text()).await,
                other => Err(DriverError::NotInteractable(format!(
                    "cannot choose an option on <{other}>"
                ))),
            },
        }
    }
}

/// One page session wrapped with selector resilience.
pub struct ResilientPage<P: PageDriver> {
    page: P,
    engine: Arc<ResolutionEngine>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<P: PageDriver> ResilientPage<P> {
    pub fn new(page: P, engine: Arc<ResolutionEngine>) -> Self {
        Self {
            page,
            engine,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn into_inner(self) -> P {
        self.page
    }

    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    /// Token that aborts in-flight and future actions on this page.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install a fresh token after a cancellation.
    pub fn reset_cancellation(&mut self) {
        self.cancel = CancellationToken::new();
    }

    pub async fn locate(&mut self, action_key: &str) -> Result<Resolution, ActionError> {
        self.perform(action_key, PageAction::Locate).await
    }

    pub async fn click(&mut self, action_key: &str) -> Result<Resolution, ActionError> {
        self.perform(action_key, PageAction::Click).await
    }

    pub async fn fill(&mut self, action_key: &str, value: &str) -> Result<Resolution, ActionError> {
        self.perform(action_key, PageAction::Fill(value)).await
    }

    pub async fn choose(
        &mut self,
        action_key: &str,
        choice: &SelectChoice,
    ) -> Result<Resolution, ActionError> {
        self.perform(action_key, PageAction::Choose(choice)).await
    }

    /// Record `selector` as a learned candidate for `action_key` and persist
    /// it immediately.
    pub async fn teach(&self, action_key: &str, selector: &str) -> Result<(), ActionError> {
        self.engine
            .store()
            .upsert(action_key, selector, Origin::Learned)
            .await
            .map_err(|source| ActionError::Persistence {
                action_key: action_key.to_string(),
                source,
            })
    }

    async fn perform(
        &mut self,
        action_key: &str,
        action: PageAction<'_>,
    ) -> Result<Resolution, ActionError> {
        let op = action.probe_op();
        let mut excluded: HashSet<String> = HashSet::new();
        let mut trace: Vec<ResolutionAttempt> = Vec::new();
        let mut last_cause: Option<String> = None;

        for round in 0..=self.policy.max_retries {
            if round > 0 {
                let delay = self.policy.delay_for(round);
                debug!(action_key, round, ?delay, "retrying after execution failure");
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(ActionError::Cancelled(action_key.to_string()));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let cascade = self
                .engine
                .cascade(&mut self.page, action_key, op, &excluded, &self.cancel)
                .await;

            let mut resolution = match cascade {
                Ok(resolution) => resolution,
                Err(ResolveError::Exhausted(mut failed)) => {
                    trace.append(&mut failed.attempts);
                    self.engine.record(action_key, &trace);
                    return Err(match last_cause {
                        Some(cause) => ActionError::ExecutionFailed {
                            action_key: action_key.to_string(),
                            cause,
                            attempts: trace,
                        },
                        None => ActionError::Resolution(SelectorResolutionFailed {
                            attempts: trace,
                            ..failed
                        }),
                    });
                }
                Err(ResolveError::Cancelled(key)) => return Err(ActionError::Cancelled(key)),
                Err(ResolveError::Persistence { action_key, source }) => {
                    return Err(ActionError::Persistence { action_key, source });
                }
            };

            match action.execute(&mut self.page, &resolution.element).await {
                Ok(()) => {
                    trace.append(&mut resolution.attempts);
                    self.engine.record(action_key, &trace);
                    resolution.attempts = trace;
                    return Ok(resolution);
                }
                Err(e) => {
                    warn!(
                        action_key,
                        selector = %resolution.selector,
                        error = %e,
                        "action failed on resolved element"
                    );
                    if let Some(last) = resolution.attempts.last_mut() {
                        last.outcome = AttemptOutcome::ExecutionFailed(e.to_string());
                    }
                    excluded.extend(resolution.attempts.iter().map(|a| a.selector.clone()));
                    trace.append(&mut resolution.attempts);
                    last_cause = Some(e.to_string());
                }
            }
        }

        self.engine.record(action_key, &trace);
        Err(ActionError::ExecutionFailed {
            action_key: action_key.to_string(),
            cause: last_cause.unwrap_or_default(),
            attempts: trace,
        })
    }
}
