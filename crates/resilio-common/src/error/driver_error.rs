use thiserror::Error;

/// Errors raised by a browser-control driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("Page not ready")]
    NotReady,

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Element is stale or detached: {0}")]
    Stale(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Page crashed: {0}")]
    PageCrashed(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Transient errors are worth polling through until a probe deadline.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverError::Stale(_) | DriverError::NotInteractable(_) | DriverError::Script(_)
        )
    }
}
