//! Cascading resolver.
//!
//! Tries builtin selectors, then learned/reasoning selectors by rank, then
//! (when enabled) asks the reasoning fallback for a new one. The first hit
//! wins. Store statistics are only touched at terminal states, so a cascade
//! that is cancelled or dropped mid-probe leaves the store unchanged.

use super::prober::{ProbeOp, ProbeOutcome, Prober};
use super::result::{
    AttemptOutcome, Resolution, ResolutionAttempt, ResolveError, SelectorResolutionFailed,
};
use crate::backend::PageDriver;
use crate::fallback::FallbackAdapter;
use crate::store::SelectorStore;
use resilio_common::Origin;
use std::collections::HashSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_MAX_CANDIDATES: usize = 8;

pub struct ResolutionEngine {
    store: SelectorStore,
    prober: Prober,
    fallback: FallbackAdapter,
    max_candidates: usize,
}

impl ResolutionEngine {
    pub fn new(store: SelectorStore, prober: Prober, fallback: FallbackAdapter) -> Self {
        Self {
            store,
            prober,
            fallback,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    pub fn store(&self) -> &SelectorStore {
        &self.store
    }

    pub fn fallback(&self) -> &FallbackAdapter {
        &self.fallback
    }

    /// Resolve `action_key` and record the outcome in the store.
    pub async fn resolve<P: PageDriver + ?Sized>(
        &self,
        page: &mut P,
        action_key: &str,
        op: ProbeOp,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        match self
            .cascade(page, action_key, op, &HashSet::new(), cancel)
            .await
        {
            Ok(resolution) => {
                self.record(action_key, &resolution.attempts);
                Ok(resolution)
            }
            Err(ResolveError::Exhausted(failed)) => {
                self.record(action_key, &failed.attempts);
                Err(ResolveError::Exhausted(failed))
            }
            Err(e) => Err(e),
        }
    }

    /// Run the cascade without recording statistics.
    ///
    /// Selectors in `excluded` are skipped and may not be suggested by the
    /// fallback tier. Only a fallback discovery is written to the store here,
    /// since it must survive a crash.
    pub async fn cascade<P: PageDriver + ?Sized>(
        &self,
        page: &mut P,
        action_key: &str,
        op: ProbeOp,
        excluded: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let candidates: Vec<_> = self
            .store
            .candidates(action_key)
            .into_iter()
            .filter(|c| !excluded.contains(&c.selector))
            .take(self.max_candidates)
            .collect();
        debug!(action_key, candidates = candidates.len(), "starting cascade");

        let mut attempts: Vec<ResolutionAttempt> = Vec::with_capacity(candidates.len() + 1);

        for candidate in candidates {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled(action_key.to_string()));
            }

            let started = Instant::now();
            let outcome = self.prober.probe(page, &candidate.selector, op).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                ProbeOutcome::Hit(element) => {
                    if !candidate.origin.is_builtin() {
                        info!(
                            action_key,
                            selector = %candidate.selector,
                            origin = %candidate.origin,
                            "resolved with cached selector"
                        );
                    }
                    attempts.push(ResolutionAttempt {
                        selector: candidate.selector.clone(),
                        origin: candidate.origin,
                        outcome: AttemptOutcome::Hit,
                        elapsed_ms,
                    });
                    return Ok(Resolution {
                        action_key: action_key.to_string(),
                        element,
                        selector: candidate.selector,
                        origin: candidate.origin,
                        attempts,
                    });
                }
                ProbeOutcome::Timeout => {
                    debug!(action_key, selector = %candidate.selector, elapsed_ms, "candidate timed out");
                    attempts.push(ResolutionAttempt {
                        selector: candidate.selector,
                        origin: candidate.origin,
                        outcome: AttemptOutcome::Timeout,
                        elapsed_ms,
                    });
                }
                ProbeOutcome::Error(cause) => {
                    warn!(action_key, selector = %candidate.selector, %cause, "candidate probe failed");
                    attempts.push(ResolutionAttempt {
                        selector: candidate.selector,
                        origin: candidate.origin,
                        outcome: AttemptOutcome::Error(cause),
                        elapsed_ms,
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled(action_key.to_string()));
        }

        let tried: Vec<String> = excluded
            .iter()
            .cloned()
            .chain(attempts.iter().map(|a| a.selector.clone()))
            .collect();

        let selector = match self.fallback.discover(page, action_key, &tried).await {
            Ok(selector) => selector,
            Err(reason) => {
                debug!(action_key, %reason, "fallback tier produced nothing");
                return Err(SelectorResolutionFailed {
                    action_key: action_key.to_string(),
                    attempts,
                    fallback: Some(reason),
                }
                .into());
            }
        };

        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled(action_key.to_string()));
        }

        self.store
            .upsert(action_key, &selector, Origin::Reasoning)
            .await
            .map_err(|source| ResolveError::Persistence {
                action_key: action_key.to_string(),
                source,
            })?;

        let started = Instant::now();
        let outcome = self.prober.probe(page, &selector, op).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let attempt_outcome = match outcome {
            ProbeOutcome::Hit(element) => {
                info!(action_key, %selector, "resolved with reasoning-discovered selector");
                attempts.push(ResolutionAttempt {
                    selector: selector.clone(),
                    origin: Origin::Reasoning,
                    outcome: AttemptOutcome::Hit,
                    elapsed_ms,
                });
                return Ok(Resolution {
                    action_key: action_key.to_string(),
                    element,
                    selector,
                    origin: Origin::Reasoning,
                    attempts,
                });
            }
            ProbeOutcome::Timeout => AttemptOutcome::Timeout,
            ProbeOutcome::Error(cause) => AttemptOutcome::Error(cause),
        };

        warn!(action_key, %selector, "reasoning-discovered selector was not confirmed");
        attempts.push(ResolutionAttempt {
            selector,
            origin: Origin::Reasoning,
            outcome: attempt_outcome,
            elapsed_ms,
        });
        Err(SelectorResolutionFailed {
            action_key: action_key.to_string(),
            attempts,
            fallback: None,
        }
        .into())
    }

    /// Batch-record a finished trace: hits count as successes, everything
    /// else as failures.
    pub fn record(&self, action_key: &str, attempts: &[ResolutionAttempt]) {
        for attempt in attempts {
            if attempt.outcome.is_hit() {
                self.store
                    .record_success(action_key, &attempt.selector, attempt.origin);
            } else {
                self.store.record_failure(action_key, &attempt.selector);
            }
        }
    }
}
