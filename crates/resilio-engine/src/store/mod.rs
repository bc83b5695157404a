//! Persistent selector cache.
//!
//! `SelectorStore` is a cheap handle over shared state: the in-memory view
//! serves candidates, while changes are queued as [`PendingWrites`] and merged
//! into the document on disk. Successes are written after a debounce window,
//! explicit inserts (`upsert`) and `prune` are written immediately, and
//! `flush` forces whatever is pending.

mod document;
mod pending;

pub use document::{DOCUMENT_VERSION, PersistenceError, StoreDocument};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pending::PendingWrites;
use resilio_common::config::schema::StoreConfig;
use resilio_common::entry::rank_order;
use resilio_common::{Origin, SelectorEntry};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub debounce: Duration,
    pub max_learned_per_action: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        let config = StoreConfig::default();
        Self::from(&config)
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            debounce: config.debounce(),
            max_learned_per_action: config.max_learned_per_action.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub actions: usize,
    pub entries: usize,
    pub builtin: usize,
    pub learned: usize,
    pub reasoning: usize,
    pub pending_writes: bool,
    pub durable_writes: u64,
}

#[derive(Default)]
struct StoreState {
    /// Every known entry, in insertion order.
    entries: Vec<SelectorEntry>,
    /// Registered builtin selectors per action, in declared order.
    builtins: HashMap<String, Vec<String>>,
    pending: PendingWrites,
}

impl StoreState {
    fn is_builtin(&self, action_key: &str, selector: &str) -> bool {
        self.builtins
            .get(action_key)
            .is_some_and(|list| list.iter().any(|s| s == selector))
    }

    fn find_mut(&mut self, action_key: &str, selector: &str) -> Option<&mut SelectorEntry> {
        self.entries.iter_mut().find(|e| e.is(action_key, selector))
    }

    /// Evict the lowest-ranked non-builtin entries beyond `cap`, never
    /// touching `keep`.
    fn enforce_cap(&mut self, action_key: &str, keep: &str, cap: usize) {
        loop {
            let mut learned: Vec<&SelectorEntry> = self
                .entries
                .iter()
                .filter(|e| {
                    e.action_key == action_key && !self.is_builtin(action_key, &e.selector)
                })
                .collect();
            if learned.len() <= cap {
                return;
            }
            learned.sort_by(|a, b| rank_order(a, b));
            let Some(victim) = learned
                .iter()
                .rev()
                .find(|e| e.selector != keep)
                .map(|e| e.selector.clone())
            else {
                return;
            };
            debug!(action_key, selector = %victim, "evicting lowest-ranked selector");
            self.entries.retain(|e| !e.is(action_key, &victim));
            self.pending.remove(action_key, &victim);
        }
    }
}

struct Inner {
    path: Option<PathBuf>,
    options: StoreOptions,
    state: RwLock<StoreState>,
    /// Serializes document writes within this process.
    io_lock: tokio::sync::Mutex<()>,
    flush_scheduled: AtomicBool,
    durable_writes: AtomicU64,
}

#[derive(Clone)]
pub struct SelectorStore {
    inner: Arc<Inner>,
}

impl SelectorStore {
    /// Open the store backed by the document at `path`.
    ///
    /// A missing document starts an empty store. An unreadable one is logged
    /// and ignored; the next write replaces it.
    pub async fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match StoreDocument::parse(&path, &content) {
                Ok(doc) => doc.entries,
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable selector cache");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no selector cache yet");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read selector cache");
                Vec::new()
            }
        };
        info!(path = %path.display(), entries = entries.len(), "selector store loaded");
        Self::build(Some(path), options, entries)
    }

    pub async fn from_config(config: &StoreConfig) -> Self {
        Self::open(config.path.clone(), StoreOptions::from(config)).await
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(options: StoreOptions) -> Self {
        Self::build(None, options, Vec::new())
    }

    fn build(path: Option<PathBuf>, options: StoreOptions, entries: Vec<SelectorEntry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                options,
                state: RwLock::new(StoreState {
                    entries,
                    ..StoreState::default()
                }),
                io_lock: tokio::sync::Mutex::new(()),
                flush_scheduled: AtomicBool::new(false),
                durable_writes: AtomicU64::new(0),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Declare the maintainer-authored selectors for an action, in the order
    /// they should be tried. Replaces any previous registration.
    pub fn register_builtins<I, S>(&self, action_key: &str, selectors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for selector in selectors {
            let selector = selector.into();
            if !selector.trim().is_empty() && !list.contains(&selector) {
                list.push(selector);
            }
        }
        let mut state = self.inner.state.write();
        state.builtins.insert(action_key.to_string(), list);
    }

    /// Candidates for `action_key`: builtins in declared order, then learned
    /// and reasoning entries by rank.
    pub fn candidates(&self, action_key: &str) -> Vec<SelectorEntry> {
        let state = self.inner.state.read();
        let now = Utc::now();

        let mut candidates: Vec<SelectorEntry> = state
            .builtins
            .get(action_key)
            .map(|list| {
                list.iter()
                    .map(|selector| {
                        let mut entry = state
                            .entries
                            .iter()
                            .find(|e| e.is(action_key, selector))
                            .cloned()
                            .unwrap_or_else(|| {
                                SelectorEntry::new(action_key, selector, Origin::Builtin, now)
                            });
                        entry.origin = Origin::Builtin;
                        entry
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut ranked: Vec<SelectorEntry> = state
            .entries
            .iter()
            .filter(|e| {
                e.action_key == action_key
                    && !e.origin.is_builtin()
                    && !state.is_builtin(action_key, &e.selector)
            })
            .cloned()
            .collect();
        ranked.sort_by(rank_order);

        candidates.extend(ranked);
        candidates
    }

    /// Stored entry for `(action_key, selector)`, if any.
    pub fn get(&self, action_key: &str, selector: &str) -> Option<SelectorEntry> {
        let state = self.inner.state.read();
        state
            .entries
            .iter()
            .find(|e| e.is(action_key, selector))
            .cloned()
    }

    /// All stored entries, optionally restricted to one action.
    pub fn entries(&self, action_key: Option<&str>) -> Vec<SelectorEntry> {
        let state = self.inner.state.read();
        state
            .entries
            .iter()
            .filter(|e| action_key.is_none_or(|k| e.action_key == k))
            .cloned()
            .collect()
    }

    pub fn record_success(&self, action_key: &str, selector: &str, origin: Origin) {
        let now = Utc::now();
        {
            let mut state = self.inner.state.write();
            let origin = if state.is_builtin(action_key, selector) {
                Origin::Builtin
            } else {
                origin
            };
            let created = state.find_mut(action_key, selector).is_none();
            if created {
                state
                    .entries
                    .push(SelectorEntry::new(action_key, selector, origin, now));
            }
            let snapshot = match state.find_mut(action_key, selector) {
                Some(entry) => {
                    entry.success_count += 1;
                    entry.last_used_at = Some(now);
                    entry.last_success_at = Some(now);
                    entry.clone()
                }
                None => return,
            };
            state.pending.success(&snapshot, now);
            if created && !origin.is_builtin() {
                state.enforce_cap(action_key, selector, self.inner.options.max_learned_per_action);
            }
        }
        self.schedule_flush();
    }

    /// Count a miss. Unknown selectors are ignored; there is no provenance to
    /// attach to them.
    pub fn record_failure(&self, action_key: &str, selector: &str) {
        let now = Utc::now();
        {
            let mut state = self.inner.state.write();
            if state.find_mut(action_key, selector).is_none() {
                if !state.is_builtin(action_key, selector) {
                    debug!(action_key, selector, "ignoring failure for unknown selector");
                    return;
                }
                state.entries.push(SelectorEntry::new(
                    action_key,
                    selector,
                    Origin::Builtin,
                    now,
                ));
            }
            let snapshot = match state.find_mut(action_key, selector) {
                Some(entry) => {
                    entry.failure_count += 1;
                    entry.last_used_at = Some(now);
                    entry.clone()
                }
                None => return,
            };
            state.pending.failure(&snapshot, now);
        }
        self.schedule_flush();
    }

    /// Insert a selector and write it out immediately.
    ///
    /// Existing entries keep their statistics and provenance.
    pub async fn upsert(
        &self,
        action_key: &str,
        selector: &str,
        origin: Origin,
    ) -> Result<(), PersistenceError> {
        {
            let now = Utc::now();
            let mut state = self.inner.state.write();
            let snapshot = match state.find_mut(action_key, selector) {
                Some(entry) => entry.clone(),
                None => {
                    let entry = SelectorEntry::new(action_key, selector, origin, now);
                    state.entries.push(entry.clone());
                    if !origin.is_builtin() {
                        state.enforce_cap(
                            action_key,
                            selector,
                            self.inner.options.max_learned_per_action,
                        );
                    }
                    entry
                }
            };
            state.pending.touch(&snapshot);
        }
        info!(action_key, selector, origin = %origin, "selector stored");
        self.write_pending().await
    }

    /// Drop entries with no success (or, when never successful, no
    /// discovery) within `max_age`. Currently registered builtins are kept;
    /// records of builtins no pack declares any more are pruned like the rest.
    pub async fn prune(&self, max_age: Duration) -> Result<usize, PersistenceError> {
        let age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::days(36_500));
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = {
            let mut state = self.inner.state.write();
            let stale: Vec<(String, String)> = state
                .entries
                .iter()
                .filter(|e| {
                    !state.is_builtin(&e.action_key, &e.selector) && e.last_activity() < cutoff
                })
                .map(|e| (e.action_key.clone(), e.selector.clone()))
                .collect();
            for (action_key, selector) in &stale {
                state.entries.retain(|e| !e.is(action_key, selector));
                state.pending.remove(action_key, selector);
            }
            stale.len()
        };

        if removed > 0 {
            info!(removed, "pruned stale selectors");
            self.write_pending().await?;
        }
        Ok(removed)
    }

    /// Write every pending change out before returning.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        self.write_pending().await
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.read();
        let mut stats = StoreStats {
            entries: state.entries.len(),
            pending_writes: !state.pending.is_empty(),
            durable_writes: self.inner.durable_writes.load(Ordering::Acquire),
            ..StoreStats::default()
        };
        let mut actions: Vec<&str> = Vec::new();
        for entry in &state.entries {
            match entry.origin {
                Origin::Builtin => stats.builtin += 1,
                Origin::Learned => stats.learned += 1,
                Origin::Reasoning => stats.reasoning += 1,
            }
            if !actions.contains(&entry.action_key.as_str()) {
                actions.push(entry.action_key.as_str());
            }
        }
        for action_key in state.builtins.keys() {
            if !actions.contains(&action_key.as_str()) {
                actions.push(action_key.as_str());
            }
        }
        stats.actions = actions.len();
        stats
    }

    fn schedule_flush(&self) {
        if self.inner.path.is_none() || self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // Stays pending until an explicit flush.
            self.inner.flush_scheduled.store(false, Ordering::Release);
            return;
        };
        let store = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(store.inner.options.debounce).await;
            store.inner.flush_scheduled.store(false, Ordering::Release);
            if let Err(e) = store.write_pending().await {
                warn!(error = %e, "debounced selector cache write failed; will retry");
                store.schedule_flush();
            }
        });
    }

    async fn write_pending(&self) -> Result<(), PersistenceError> {
        let _io = self.inner.io_lock.lock().await;

        let taken = {
            let mut state = self.inner.state.write();
            if state.pending.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut state.pending)
        };

        let Some(path) = self.inner.path.clone() else {
            // Memory-only: the view already reflects every change.
            return Ok(());
        };

        let job = taken.clone();
        let result = tokio::task::spawn_blocking(move || document::merge_and_write(&path, &job))
            .await
            .unwrap_or_else(|e| Err(PersistenceError::Task(e.to_string())));

        let mut state = self.inner.state.write();
        match result {
            Ok(merged) => {
                state.entries = state.pending.apply_to(merged);
                self.inner.durable_writes.fetch_add(1, Ordering::AcqRel);
                debug!(entries = state.entries.len(), "selector cache written");
                Ok(())
            }
            Err(e) => {
                state.pending.requeue(taken);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SelectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorStore")
            .field("path", &self.inner.path)
            .field("entries", &self.len())
            .finish()
    }
}
