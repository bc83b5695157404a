use crate::backend::PageDriver;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resilio_common::config::schema::FallbackConfig;
use resilio_common::{DriverError, ImageFormat};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SnapshotLimits {
    pub jpeg_quality: u8,
    pub max_structure_chars: usize,
    pub max_screenshot_bytes: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self::from(&FallbackConfig::default())
    }
}

impl From<&FallbackConfig> for SnapshotLimits {
    fn from(config: &FallbackConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            max_structure_chars: config.max_structure_chars,
            max_screenshot_bytes: config.max_screenshot_bytes,
        }
    }
}

/// Bounded capture of the page handed to the reasoning service.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: Option<String>,
    /// Base64 JPEG of the viewport; absent when capture failed or was too large.
    pub screenshot_jpeg: Option<String>,
    pub structure: String,
}

impl PageSnapshot {
    /// Capture a snapshot. Only a failed structural dump is an error; the
    /// screenshot and URL are best-effort.
    pub async fn capture<P: PageDriver + ?Sized>(
        page: &mut P,
        limits: &SnapshotLimits,
    ) -> Result<Self, DriverError> {
        let screenshot_jpeg = match page
            .screenshot(ImageFormat::Jpeg {
                quality: limits.jpeg_quality,
            })
            .await
        {
            Ok(bytes) if bytes.len() <= limits.max_screenshot_bytes => Some(BASE64.encode(bytes)),
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "screenshot over budget; sending structure only");
                None
            }
            Err(e) => {
                debug!(error = %e, "screenshot unavailable; sending structure only");
                None
            }
        };

        let structure = page.structure_snapshot().await?;
        let url = page.current_url().await.ok();

        Ok(Self {
            url,
            screenshot_jpeg,
            structure: truncate_chars(&structure, limits.max_structure_chars),
        })
    }
}

/// First `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
