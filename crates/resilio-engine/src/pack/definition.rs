use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A maintainer-authored set of builtin selectors for one application.
///
/// ```yaml
/// pack: sei
/// description: Login and document flows
/// actions:
///   login.button:
///     - "#sbmLogin"
///     - "button[type=submit]"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorPack {
    pub pack: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Action key to selectors in probe order.
    #[serde(default)]
    pub actions: BTreeMap<String, Vec<String>>,
}

impl SelectorPack {
    pub fn selector_count(&self) -> usize {
        self.actions.values().map(Vec::len).sum()
    }
}
