//! Failure reports for out-of-band diagnosis of a failed action.

use crate::actions::ActionError;
use crate::backend::PageDriver;
use crate::fallback::snapshot::truncate_chars;
use crate::resolution::ResolutionAttempt;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use resilio_common::{AxNode, ImageFormat};
use serde::Serialize;
use std::fmt::Write;
use tracing::debug;

pub const MAX_OUTLINE_CHARS: usize = 10_000;
const TRUNCATION_MARKER: &str = "\n... [truncated]";

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub action_key: String,
    pub error: String,
    pub attempts: Vec<ResolutionAttempt>,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Base64 PNG of the viewport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_png: Option<String>,
    /// Accessibility outline, or the structural dump when the driver has no
    /// accessibility tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_outline: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capture_errors: Vec<String>,
}

impl FailureReport {
    /// Package `error` with whatever the page can still tell us. Capture
    /// failures are noted in the report, never raised.
    pub async fn capture<P: PageDriver + ?Sized>(page: &mut P, error: &ActionError) -> Self {
        let mut capture_errors = Vec::new();

        let screenshot_png = match page.screenshot(ImageFormat::Png).await {
            Ok(bytes) => Some(BASE64.encode(bytes)),
            Err(e) => {
                capture_errors.push(format!("screenshot: {e}"));
                None
            }
        };

        let page_outline = match page.accessibility_tree().await {
            Ok(Some(tree)) => Some(serialize_ax_tree(&tree)),
            Ok(None) | Err(_) => match page.structure_snapshot().await {
                Ok(structure) => Some(structure),
                Err(e) => {
                    capture_errors.push(format!("page outline: {e}"));
                    None
                }
            },
        }
        .map(|outline| truncate_outline(&outline));

        let url = page.current_url().await.ok();
        if !capture_errors.is_empty() {
            debug!(action_key = error.action_key(), errors = ?capture_errors, "partial failure report");
        }

        Self {
            action_key: error.action_key().to_string(),
            error: error.to_string(),
            attempts: error.attempts().to_vec(),
            captured_at: Utc::now(),
            url,
            screenshot_png,
            page_outline,
            capture_errors,
        }
    }
}

/// Render an accessibility tree as an indented `- role "name"` outline.
pub fn serialize_ax_tree(root: &AxNode) -> String {
    let mut out = String::new();
    write_node(&mut out, root, 0);
    out
}

fn write_node(out: &mut String, node: &AxNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{indent}- {}", node.role);
    if !node.name.is_empty() {
        let _ = write!(out, " {:?}", node.name);
    }
    out.push('\n');
    if let Some(value) = node.value.as_deref().filter(|v| !v.is_empty()) {
        let _ = writeln!(out, "{indent}  value: {value:?}");
    }
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}

fn truncate_outline(outline: &str) -> String {
    if outline.chars().count() <= MAX_OUTLINE_CHARS {
        return outline.to_string();
    }
    let mut truncated = truncate_chars(outline, MAX_OUTLINE_CHARS);
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
