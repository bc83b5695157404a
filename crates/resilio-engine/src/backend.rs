use async_trait::async_trait;
use resilio_common::{AxNode, DriverError, ElementHandle, ImageFormat, SelectChoice};

/// Browser-control capability the engine drives.
///
/// One implementation wraps one page session. Calls are sequential: the
/// engine never issues a new call before the previous one has returned.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Look up the first element matching `selector`.
    ///
    /// `Ok(None)` means "not on the page right now". Malformed selectors are
    /// reported as `DriverError::InvalidSelector`.
    async fn query(&mut self, selector: &str) -> Result<Option<ElementHandle>, DriverError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Replace the element's value with `value`.
    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        choice: &SelectChoice,
    ) -> Result<(), DriverError>;

    /// Capture the current viewport.
    async fn screenshot(&mut self, format: ImageFormat) -> Result<Vec<u8>, DriverError>;

    /// Textual dump of the visible interactive elements, one per line.
    async fn structure_snapshot(&mut self) -> Result<String, DriverError>;

    async fn accessibility_tree(&mut self) -> Result<Option<AxNode>, DriverError> {
        Err(DriverError::NotSupported("accessibility_tree".into()))
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Err(DriverError::NotSupported("current_url".into()))
    }
}
