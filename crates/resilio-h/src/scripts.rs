//! Page-side scripts.
//!
//! Every script returns a JSON string so the result decodes the same way
//! whether the page produced an object, `null` or an error.

use chromiumoxide::Page;
use resilio_common::{DriverError, SelectChoice};
use serde::Deserialize;
use std::time::Duration;

/// Upper bound for one evaluation; an unhandled dialog would block forever.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONTEXT_RETRIES: u32 = 10;
const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Finds the first match in the document or any same-origin frame.
const FIND_HELPER: &str = r#"
const __find = (sel) => {
  const search = (doc) => {
    const hit = doc.querySelector(sel);
    if (hit) return hit;
    for (const frame of doc.querySelectorAll('iframe, frame')) {
      let inner = null;
      try { inner = frame.contentDocument; } catch (_) { inner = null; }
      if (inner) {
        const found = search(inner);
        if (found) return found;
      }
    }
    return null;
  };
  return search(document);
};
const __visible = (el) => {
  const view = el.ownerDocument.defaultView || window;
  const style = view.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  return style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0;
};
"#;

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum QueryReply {
    Found { tag: String, visible: bool },
    Missing,
    Invalid { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum ActionReply {
    Ok,
    Missing,
    Disabled,
    NoOption,
}

impl ActionReply {
    pub(crate) fn into_result(self, selector: &str) -> Result<(), DriverError> {
        match self {
            ActionReply::Ok => Ok(()),
            ActionReply::Missing => Err(DriverError::Stale(selector.to_string())),
            ActionReply::Disabled => Err(DriverError::NotInteractable(format!(
                "{selector} is disabled"
            ))),
            ActionReply::NoOption => Err(DriverError::NotInteractable(format!(
                "{selector} has no matching option"
            ))),
        }
    }
}

fn literal(value: &str) -> String {
    // A JSON string is a valid JS string literal.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn query(selector: &str) -> String {
    format!(
        r#"(() => {{
{FIND_HELPER}
  let el;
  try {{ el = __find({sel}); }} catch (e) {{
    return JSON.stringify({{ status: 'invalid', message: String((e && e.message) || e) }});
  }}
  if (!el) return JSON.stringify({{ status: 'missing' }});
  return JSON.stringify({{ status: 'found', tag: el.tagName.toLowerCase(), visible: __visible(el) }});
}})()"#,
        sel = literal(selector)
    )
}

pub(crate) fn click(selector: &str) -> String {
    format!(
        r#"(() => {{
{FIND_HELPER}
  const el = __find({sel});
  if (!el) return JSON.stringify({{ status: 'missing' }});
  if (el.disabled) return JSON.stringify({{ status: 'disabled' }});
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  el.click();
  return JSON.stringify({{ status: 'ok' }});
}})()"#,
        sel = literal(selector)
    )
}

pub(crate) fn fill(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
{FIND_HELPER}
  const el = __find({sel});
  if (!el) return JSON.stringify({{ status: 'missing' }});
  if (el.disabled || el.readOnly) return JSON.stringify({{ status: 'disabled' }});
  el.focus();
  const proto = Object.getPrototypeOf(el);
  const setter = Object.getOwnPropertyDescriptor(proto, 'value');
  if (setter && setter.set) {{ setter.set.call(el, {val}); }} else {{ el.value = {val}; }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify({{ status: 'ok' }});
}})()"#,
        sel = literal(selector),
        val = literal(value)
    )
}

pub(crate) fn select_option(selector: &str, choice: &SelectChoice) -> String {
    let (by_label, wanted) = match choice {
        SelectChoice::Label(label) => (true, label.as_str()),
        SelectChoice::Value(value) => (false, value.as_str()),
    };
    format!(
        r#"(() => {{
{FIND_HELPER}
  const el = __find({sel});
  if (!el) return JSON.stringify({{ status: 'missing' }});
  if (el.disabled) return JSON.stringify({{ status: 'disabled' }});
  const wanted = {wanted};
  const option = Array.from(el.options || []).find((o) =>
    {by_label} ? o.text.trim() === wanted.trim() : o.value === wanted);
  if (!option) return JSON.stringify({{ status: 'no_option' }});
  el.value = option.value;
  option.selected = true;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify({{ status: 'ok' }});
}})()"#,
        sel = literal(selector),
        wanted = literal(wanted),
        by_label = by_label
    )
}

/// One line per visible interactive element, capped at `max_chars`.
pub(crate) fn structure(max_chars: usize) -> String {
    format!(
        r#"(() => {{
  const tags = ['input', 'button', 'select', 'textarea', 'a', 'label'];
  const attrs = ['id', 'name', 'class', 'type', 'role', 'aria-label', 'placeholder', 'href', 'value', 'title'];
  const lines = [];
  const walk = (doc, prefix) => {{
    for (const el of doc.querySelectorAll(tags.join(','))) {{
      if (el.offsetParent === null) continue;
      const parts = [];
      for (const a of attrs) {{
        const v = el.getAttribute(a);
        if (v) parts.push(a + '="' + v.substring(0, 80) + '"');
      }}
      const text = (el.textContent || '').trim().replace(/\s+/g, ' ').substring(0, 60);
      lines.push(prefix + '<' + el.tagName.toLowerCase() + ' ' + parts.join(' ') + (text ? ' text="' + text + '"' : '') + '/>');
    }}
    for (const frame of doc.querySelectorAll('iframe, frame')) {{
      let inner = null;
      try {{ inner = frame.contentDocument; }} catch (_) {{ inner = null; }}
      const name = frame.getAttribute('name') || frame.getAttribute('id') || 'frame';
      if (inner) walk(inner, prefix + '[' + name + '] ');
    }}
  }};
  walk(document, '');
  return JSON.stringify(lines.join('\n').substring(0, {max_chars}));
}})()"#
    )
}

fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

/// Evaluate `script` and decode its JSON-string result, retrying while the
/// page is between documents.
pub(crate) async fn evaluate<T: serde::de::DeserializeOwned>(
    page: &Page,
    script: &str,
) -> Result<T, DriverError> {
    let mut last_error = String::new();
    for attempt in 0..MAX_CONTEXT_RETRIES {
        let outcome = tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(script)).await;
        let result = match outcome {
            Err(_) => return Err(DriverError::Script("evaluation timed out".into())),
            Ok(result) => result,
        };
        match result {
            Ok(value) => {
                let json: String = value
                    .into_value()
                    .map_err(|e| DriverError::Script(format!("unexpected script result: {e}")))?;
                return serde_json::from_str(&json)
                    .map_err(|e| DriverError::Script(format!("undecodable script result: {e}")));
            }
            Err(e) => {
                let message = e.to_string();
                if !is_context_error(&message) {
                    return Err(DriverError::Script(message));
                }
                tracing::debug!(
                    "evaluation context unavailable (attempt {}/{}), retrying",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = message;
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
        }
    }
    Err(DriverError::Script(last_error))
}
