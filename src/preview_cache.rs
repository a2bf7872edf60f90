//! Hand-off store for rendered preview markup.
//!
//! The editor saves the XHTML it wants previewed under a key and the preview
//! side takes it out again. Entries are consumed by [`PreviewCache::load`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

/// Limits for a [`PreviewCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewCacheConfig {
    /// Evict the oldest entries beyond this many. `None` keeps everything.
    pub max_entries: Option<usize>,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, String>,
    order: VecDeque<String>,
}

#[derive(Debug, Default)]
pub struct PreviewCache {
    config: PreviewCacheConfig,
    entries: Mutex<Entries>,
}

impl PreviewCache {
    pub fn new(config: PreviewCacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn config(&self) -> PreviewCacheConfig {
        self.config
    }

    /// Store `xhtml` under `key`, replacing any previous entry.
    pub fn save(&self, key: impl Into<String>, xhtml: impl Into<String>) {
        let key = key.into();
        let mut entries = self.lock();

        entries.order.retain(|k| *k != key);
        if let Some(max) = self.config.max_entries {
            while entries.order.len() >= max.max(1) {
                let Some(oldest) = entries.order.pop_front() else {
                    break;
                };
                debug!("evicting preview {oldest}");
                entries.map.remove(&oldest);
            }
        }

        entries.order.push_back(key.clone());
        entries.map.insert(key, xhtml.into());
    }

    /// Remove and return the entry for `key`.
    pub fn load(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        entries.order.retain(|k| k != key);
        entries.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
