use chrono::{DateTime, Utc};
use resilio_common::{Origin, SelectorEntry};

/// Changes made in memory that have not reached the document yet.
///
/// Counters are kept as increments so that concurrent writers merging into
/// the same document add up instead of overwriting each other.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingWrites {
    deltas: Vec<Delta>,
    removals: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Delta {
    action_key: String,
    selector: String,
    origin: Origin,
    discovered_at: DateTime<Utc>,
    successes: u64,
    failures: u64,
    last_used_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

impl Delta {
    fn is(&self, action_key: &str, selector: &str) -> bool {
        self.action_key == action_key && self.selector == selector
    }

    fn absorb(&mut self, other: &Delta) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.last_used_at = self.last_used_at.max(other.last_used_at);
        self.last_success_at = self.last_success_at.max(other.last_success_at);
        self.discovered_at = self.discovered_at.min(other.discovered_at);
    }

    fn apply(&self, entry: &mut SelectorEntry) {
        entry.success_count += self.successes;
        entry.failure_count += self.failures;
        entry.last_used_at = entry.last_used_at.max(self.last_used_at);
        entry.last_success_at = entry.last_success_at.max(self.last_success_at);
    }

    fn to_entry(&self) -> SelectorEntry {
        let mut entry = SelectorEntry::new(
            self.action_key.clone(),
            self.selector.clone(),
            self.origin,
            self.discovered_at,
        );
        self.apply(&mut entry);
        entry
    }
}

impl PendingWrites {
    pub(crate) fn is_empty(&self) -> bool {
        self.deltas.is_empty() && self.removals.is_empty()
    }

    /// Ensure the entry exists in the document even without counter changes.
    pub(crate) fn touch(&mut self, entry: &SelectorEntry) {
        self.delta_for(entry);
    }

    pub(crate) fn success(&mut self, entry: &SelectorEntry, at: DateTime<Utc>) {
        let delta = self.delta_for(entry);
        delta.successes += 1;
        delta.last_used_at = delta.last_used_at.max(Some(at));
        delta.last_success_at = delta.last_success_at.max(Some(at));
    }

    pub(crate) fn failure(&mut self, entry: &SelectorEntry, at: DateTime<Utc>) {
        let delta = self.delta_for(entry);
        delta.failures += 1;
        delta.last_used_at = delta.last_used_at.max(Some(at));
    }

    pub(crate) fn remove(&mut self, action_key: &str, selector: &str) {
        self.deltas.retain(|d| !d.is(action_key, selector));
        if !self.is_removed(action_key, selector) {
            self.removals
                .push((action_key.to_string(), selector.to_string()));
        }
    }

    /// Put back changes from a write that failed. `self` holds the changes
    /// made since; they are newer and take precedence over old removals.
    pub(crate) fn requeue(&mut self, older: PendingWrites) {
        for (action_key, selector) in older.removals {
            let recreated = self.deltas.iter().any(|d| d.is(&action_key, &selector));
            if !recreated && !self.is_removed(&action_key, &selector) {
                self.removals.push((action_key, selector));
            }
        }
        for old in older.deltas {
            if self.is_removed(&old.action_key, &old.selector) {
                continue;
            }
            match self
                .deltas
                .iter_mut()
                .find(|d| d.is(&old.action_key, &old.selector))
            {
                Some(newer) => newer.absorb(&old),
                None => self.deltas.push(old),
            }
        }
    }

    /// Merge these changes into `entries`, preserving their order and
    /// appending entries that did not exist yet.
    pub(crate) fn apply_to(&self, mut entries: Vec<SelectorEntry>) -> Vec<SelectorEntry> {
        entries.retain(|e| !self.is_removed(&e.action_key, &e.selector));
        for delta in &self.deltas {
            match entries
                .iter_mut()
                .find(|e| e.is(&delta.action_key, &delta.selector))
            {
                Some(entry) => delta.apply(entry),
                None => entries.push(delta.to_entry()),
            }
        }
        entries
    }

    fn is_removed(&self, action_key: &str, selector: &str) -> bool {
        self.removals
            .iter()
            .any(|(k, s)| k == action_key && s == selector)
    }

    fn delta_for(&mut self, entry: &SelectorEntry) -> &mut Delta {
        self.removals
            .retain(|(k, s)| !(k == &entry.action_key && s == &entry.selector));
        let index = match self
            .deltas
            .iter()
            .position(|d| d.is(&entry.action_key, &entry.selector))
        {
            Some(index) => index,
            None => {
                self.deltas.push(Delta {
                    action_key: entry.action_key.clone(),
                    selector: entry.selector.clone(),
                    origin: entry.origin,
                    discovered_at: entry.discovered_at,
                    successes: 0,
                    failures: 0,
                    last_used_at: None,
                    last_success_at: None,
                });
                self.deltas.len() - 1
            }
        };
        &mut self.deltas[index]
    }
}
