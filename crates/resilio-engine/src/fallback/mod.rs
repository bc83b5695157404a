//! Reasoning fallback tier.
//!
//! When every cached candidate misses, the adapter sends a bounded snapshot of
//! the page to an external reasoning service and asks for a new locator. The
//! reply is advisory: it is parsed, checked for plausibility and queried on
//! the live page before it is handed back to the resolver.

pub mod anthropic;
pub mod parse;
pub mod snapshot;

pub use anthropic::{AnthropicConfig, AnthropicReasoner};
pub use snapshot::{PageSnapshot, SnapshotLimits};

use crate::backend::PageDriver;
use async_trait::async_trait;
use resilio_common::config::schema::FallbackConfig;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackUnavailable {
    #[error("reasoning fallback is disabled")]
    Disabled,
    #[error("no reasoning service configured")]
    NoService,
    #[error("failed to capture page snapshot: {0}")]
    Snapshot(String),
    #[error("reasoning service error: {0}")]
    Service(String),
    #[error("reply did not contain a usable selector")]
    Unparseable,
    #[error("suggested selector '{0}' was already attempted")]
    AlreadyAttempted(String),
    #[error("suggested selector '{0}' is not on the page")]
    NotOnPage(String),
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Reasoning service not configured: {0}")]
    NotConfigured(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// What the reasoning service is asked about.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub action_key: String,
    /// Selectors that already failed for this action.
    pub tried: Vec<String>,
    pub snapshot: PageSnapshot,
}

impl ReasoningRequest {
    pub fn prompt(&self) -> String {
        let tried = if self.tried.is_empty() {
            "(none)".to_string()
        } else {
            self.tried.join("\n")
        };
        let url = self.snapshot.url.as_deref().unwrap_or("(unknown)");
        format!(
            "You are automating a legacy case-management web portal whose markup changes often.\n\n\
             TASK: none of the known CSS selectors for the action below found an element. \
             Suggest one alternative selector for the element that performs this action.\n\n\
             ACTION: {}\n\
             PAGE URL: {}\n\n\
             SELECTORS THAT FAILED:\n{}\n\n\
             VISIBLE INTERACTIVE ELEMENTS:\n{}\n\n\
             Reply with the CSS selector only, no explanation, in the form:\n\
             SELECTOR: <selector>",
            self.action_key, url, tried, self.snapshot.structure
        )
    }
}

/// External capability that turns a page snapshot into a selector guess.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Free-form reply text.
    async fn suggest(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}

pub struct FallbackAdapter {
    enabled: bool,
    service: Option<Arc<dyn ReasoningService>>,
    limits: SnapshotLimits,
}

impl FallbackAdapter {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            service: None,
            limits: SnapshotLimits::default(),
        }
    }

    pub fn new(service: Arc<dyn ReasoningService>) -> Self {
        Self {
            enabled: true,
            service: Some(service),
            limits: SnapshotLimits::default(),
        }
    }

    /// Build from configuration. Enabled without an API key leaves the tier
    /// unavailable rather than failing startup.
    pub fn from_config(config: &FallbackConfig) -> Self {
        let limits = SnapshotLimits::from(config);
        if !config.enabled {
            return Self {
                limits,
                ..Self::disabled()
            };
        }

        let service: Option<Arc<dyn ReasoningService>> = match &config.api_key {
            Some(key) if !key.trim().is_empty() => {
                let anthropic = AnthropicConfig::new(key.clone())
                    .with_base_url(config.base_url.clone())
                    .with_model(config.model.clone())
                    .with_timeout(config.timeout());
                match AnthropicReasoner::new(anthropic) {
                    Ok(reasoner) => Some(Arc::new(reasoner)),
                    Err(e) => {
                        warn!(error = %e, "reasoning fallback unavailable");
                        None
                    }
                }
            }
            _ => {
                warn!("reasoning fallback enabled but no API key configured");
                None
            }
        };

        Self {
            enabled: true,
            service,
            limits,
        }
    }

    pub fn with_limits(mut self, limits: SnapshotLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ask the reasoning service for a locator for `action_key`.
    ///
    /// Never contacts the service when disabled. A suggestion that was
    /// already tried, or that is not on the page, is rejected.
    pub async fn discover<P: PageDriver + ?Sized>(
        &self,
        page: &mut P,
        action_key: &str,
        tried: &[String],
    ) -> Result<String, FallbackUnavailable> {
        if !self.enabled {
            return Err(FallbackUnavailable::Disabled);
        }
        let Some(service) = &self.service else {
            return Err(FallbackUnavailable::NoService);
        };

        let snapshot = PageSnapshot::capture(page, &self.limits)
            .await
            .map_err(|e| FallbackUnavailable::Snapshot(e.to_string()))?;

        let request = ReasoningRequest {
            action_key: action_key.to_string(),
            tried: tried.to_vec(),
            snapshot,
        };

        info!(action_key, "asking reasoning service for a selector");
        let reply = service.suggest(&request).await.map_err(|e| {
            warn!(action_key, error = %e, "reasoning service failed");
            FallbackUnavailable::Service(e.to_string())
        })?;

        let selector = parse::extract_selector(&reply).ok_or_else(|| {
            warn!(action_key, "reasoning reply had no usable selector");
            FallbackUnavailable::Unparseable
        })?;

        if tried.contains(&selector) {
            return Err(FallbackUnavailable::AlreadyAttempted(selector));
        }

        match page.query(&selector).await {
            Ok(Some(_)) => Ok(selector),
            Ok(None) => Err(FallbackUnavailable::NotOnPage(selector)),
            Err(e) => {
                warn!(action_key, %selector, error = %e, "suggested selector failed validation");
                Err(FallbackUnavailable::NotOnPage(selector))
            }
        }
    }
}
