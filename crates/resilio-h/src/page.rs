use crate::ax;
use crate::cdp::CdpClient;
use crate::scripts::{self, ActionReply, QueryReply};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::accessibility::GetFullAxTreeParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use resilio_common::{AxNode, DriverError, ElementHandle, ImageFormat, SelectChoice};
use resilio_engine::backend::PageDriver;
use tracing::info;

const STRUCTURE_SCRIPT_CAP: usize = 20_000;

/// A Chromium page driven over CDP.
pub struct HeadlessPage {
    client: Option<CdpClient>,
    visible: bool,
}

impl HeadlessPage {
    pub fn new(visible: bool) -> Self {
        Self {
            client: None,
            visible,
        }
    }

    pub async fn launch(&mut self) -> Result<(), DriverError> {
        info!("Launching Chromium...");
        let client = CdpClient::launch(self.visible)
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| DriverError::Other(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    /// Navigate and wait for the load event. Returns the final URL.
    pub async fn navigate(&mut self, url: &str) -> Result<String, DriverError> {
        let page = self.page()?;
        info!("Navigating to: {}", url);
        page.goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(page
            .url()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?
            .unwrap_or_else(|| url.to_string()))
    }

    fn page(&self) -> Result<&chromiumoxide::Page, DriverError> {
        self.client
            .as_ref()
            .map(|c| &c.page)
            .ok_or(DriverError::NotReady)
    }
}

impl Default for HeadlessPage {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl PageDriver for HeadlessPage {
    async fn query(&mut self, selector: &str) -> Result<Option<ElementHandle>, DriverError> {
        let page = self.page()?;
        match scripts::evaluate::<QueryReply>(page, &scripts::query(selector)).await? {
            QueryReply::Found { tag, visible } => {
                Ok(Some(ElementHandle::new(selector, tag, visible)))
            }
            QueryReply::Missing => Ok(None),
            QueryReply::Invalid { message } => Err(DriverError::InvalidSelector {
                selector: selector.to_string(),
                reason: message,
            }),
        }
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let page = self.page()?;
        scripts::evaluate::<ActionReply>(page, &scripts::click(&element.selector))
            .await?
            .into_result(&element.selector)
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        let page = self.page()?;
        scripts::evaluate::<ActionReply>(page, &scripts::fill(&element.selector, value))
            .await?
            .into_result(&element.selector)
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        choice: &SelectChoice,
    ) -> Result<(), DriverError> {
        let page = self.page()?;
        scripts::evaluate::<ActionReply>(page, &scripts::select_option(&element.selector, choice))
            .await?
            .into_result(&element.selector)
    }

    async fn screenshot(&mut self, format: ImageFormat) -> Result<Vec<u8>, DriverError> {
        let page = self.page()?;
        let params = match format {
            ImageFormat::Jpeg { quality } => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(i64::from(quality))
                .build(),
            ImageFormat::Png => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        };
        page.screenshot(params)
            .await
            .map_err(|e| DriverError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn structure_snapshot(&mut self) -> Result<String, DriverError> {
        let page = self.page()?;
        scripts::evaluate::<String>(page, &scripts::structure(STRUCTURE_SCRIPT_CAP)).await
    }

    async fn accessibility_tree(&mut self) -> Result<Option<AxNode>, DriverError> {
        let page = self.page()?;
        let response = page
            .execute(GetFullAxTreeParams::default())
            .await
            .map_err(|e| DriverError::Other(format!("Accessibility tree failed: {}", e)))?;
        let nodes = serde_json::to_value(&response.result.nodes)
            .map_err(|e| DriverError::Other(e.to_string()))?;
        Ok(nodes.as_array().and_then(|nodes| ax::tree_from_cdp(nodes)))
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let page = self.page()?;
        page.url()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?
            .ok_or_else(|| DriverError::Other("page has no URL".into()))
    }
}
