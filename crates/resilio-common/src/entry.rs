use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Provenance of a selector candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Hand-authored by the maintainer (selector packs).
    Builtin,
    /// Taught explicitly by an operator or a call site.
    Learned,
    /// Discovered by the reasoning fallback tier.
    Reasoning,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Builtin => "builtin",
            Origin::Learned => "learned",
            Origin::Reasoning => "reasoning",
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Origin::Builtin)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selector candidate for a logical action, with its usage history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub action_key: String,
    pub selector: String,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    pub origin: Origin,
}

impl SelectorEntry {
    pub fn new(
        action_key: impl Into<String>,
        selector: impl Into<String>,
        origin: Origin,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            action_key: action_key.into(),
            selector: selector.into(),
            success_count: 0,
            failure_count: 0,
            last_used_at: None,
            last_success_at: None,
            discovered_at: now,
            origin,
        }
    }

    /// Whether this entry describes `selector` for `action_key`.
    pub fn is(&self, action_key: &str, selector: &str) -> bool {
        self.action_key == action_key && self.selector == selector
    }

    /// Most recent evidence that the entry is still useful.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_success_at.unwrap_or(self.discovered_at)
    }
}

/// Ordering used when serving non-builtin candidates.
///
/// Higher success count first, then the most recent success, then the entry
/// discovered earliest. Callers sort stably so entries that still compare
/// equal keep their insertion order.
pub fn rank_order(a: &SelectorEntry, b: &SelectorEntry) -> Ordering {
    b.success_count
        .cmp(&a.success_count)
        .then_with(|| b.last_success_at.cmp(&a.last_success_at))
        .then_with(|| a.discovered_at.cmp(&b.discovered_at))
}
