use crate::fallback::FallbackUnavailable;
use crate::store::PersistenceError;
use resilio_common::{ElementHandle, Origin};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "cause", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Hit,
    Timeout,
    Error(String),
    /// Found, but the page action on it failed.
    ExecutionFailed(String),
}

impl AttemptOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, AttemptOutcome::Hit)
    }
}

/// One candidate tried during a cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionAttempt {
    pub selector: String,
    pub origin: Origin,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

/// A successful cascade.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub action_key: String,
    pub element: ElementHandle,
    pub selector: String,
    pub origin: Origin,
    /// Every attempt in order; the last one is the hit.
    pub attempts: Vec<ResolutionAttempt>,
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("No selector for '{action_key}' matched after {} attempt(s)", attempts.len())]
pub struct SelectorResolutionFailed {
    pub action_key: String,
    pub attempts: Vec<ResolutionAttempt>,
    /// Why the fallback tier produced nothing. `None` when it did suggest a
    /// selector (that attempt is in `attempts`).
    #[serde(serialize_with = "serialize_reason")]
    pub fallback: Option<FallbackUnavailable>,
}

fn serialize_reason<S: serde::Serializer>(
    reason: &Option<FallbackUnavailable>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match reason {
        Some(reason) => serializer.serialize_some(&reason.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Exhausted(#[from] SelectorResolutionFailed),

    #[error("Resolution of '{0}' was cancelled")]
    Cancelled(String),

    #[error("Failed to persist discovered selector for '{action_key}': {source}")]
    Persistence {
        action_key: String,
        #[source]
        source: PersistenceError,
    },
}
