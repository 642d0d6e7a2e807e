//! Cache keys, route revalidation and the in-process read cache.
//!
//! Mutations call [`CacheCoordinator`] synchronously after a successful write.
//! The coordinator fans out to every registered [`Revalidator`]; nothing is
//! deferred and nothing expires on a timer.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;

pub const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKey {
    Photos,
    Photo,
    Tags,
    Cameras,
    FilmSimulations,
}

impl CacheKey {
    pub const ALL: [CacheKey; 5] = [
        CacheKey::Photos,
        CacheKey::Photo,
        CacheKey::Tags,
        CacheKey::Cameras,
        CacheKey::FilmSimulations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Photos => "photos",
            CacheKey::Photo => "photo",
            CacheKey::Tags => "tags",
            CacheKey::Cameras => "cameras",
            CacheKey::FilmSimulations => "film-simulations",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// A cache surface that can drop everything tagged with a key or rendered
/// under a route path.
pub trait Revalidator: Send + Sync {
    fn revalidate_key(&self, key: CacheKey);
    fn revalidate_path(&self, path: &str);
}

#[derive(Clone)]
pub struct CacheCoordinator {
    revalidators: Vec<Arc<dyn Revalidator>>,
    admin_paths: Vec<String>,
}

impl fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("revalidators", &self.revalidators.len())
            .field("admin_paths", &self.admin_paths)
            .finish()
    }
}

impl CacheCoordinator {
    pub fn new(admin_paths: Vec<String>) -> Self {
        Self {
            revalidators: Vec::new(),
            admin_paths,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.cache.admin_paths.clone())
    }

    pub fn with_revalidator(mut self, revalidator: Arc<dyn Revalidator>) -> Self {
        self.revalidators.push(revalidator);
        self
    }

    pub fn invalidate_key(&self, key: CacheKey) {
        debug!(key = key.as_str(), "revalidating key");
        for r in &self.revalidators {
            r.revalidate_key(key);
        }
    }

    fn invalidate_path(&self, path: &str) {
        debug!(path, "revalidating path");
        for r in &self.revalidators {
            r.revalidate_path(path);
        }
    }

    pub fn invalidate_admin_views(&self) {
        for path in &self.admin_paths {
            self.invalidate_path(path);
        }
    }

    /// Every key, every admin path and the root layout.
    pub fn invalidate_all(&self) {
        for key in CacheKey::ALL {
            self.invalidate_key(key);
        }
        self.invalidate_admin_views();
        self.invalidate_path(ROOT_PATH);
    }
}

#[derive(Debug)]
struct CachedEntry {
    keys: Vec<CacheKey>,
    value: serde_json::Value,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedEntry>,
    // Insertion order of `entries`, oldest first.
    order: VecDeque<String>,
    stale_paths: BTreeSet<String>,
    // Bumped on every key revalidation; loads started before a bump are not stored.
    generation: u64,
}

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// In-process read cache. Entries are serialized read results tagged with
/// the keys that invalidate them. At most `max_entries` are held; the oldest
/// entry is evicted to make room.
#[derive(Debug)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
    max_entries: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            state: Mutex::default(),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().entries.contains_key(name)
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.lock().entries.get(name)?.value.clone();
        serde_json::from_value(value).ok()
    }

    fn store<T: Serialize>(&self, name: &str, keys: &[CacheKey], value: &T, generation: Option<u64>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, name, "value not cacheable");
                return;
            }
        };
        let mut state = self.lock();
        if generation.is_some_and(|g| g != state.generation) {
            return;
        }
        if !state.entries.contains_key(name) {
            while state.entries.len() >= self.max_entries {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
                debug!(name = %oldest, "cache entry evicted");
            }
            state.order.push_back(name.to_string());
        }
        state.entries.insert(
            name.to_string(),
            CachedEntry {
                keys: keys.to_vec(),
                value,
            },
        );
    }

    pub fn put<T: Serialize>(&self, name: &str, keys: &[CacheKey], value: &T) {
        self.store(name, keys, value, None);
    }

    /// Return the cached value for `name`, or run `load` and cache its result.
    /// Errors are returned uncached.
    pub async fn get_or_load<T, F, Fut>(&self, name: &str, keys: &[CacheKey], load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(name) {
            debug!(name, "cache hit");
            return Ok(hit);
        }
        let generation = self.lock().generation;
        let value = load().await?;
        self.store(name, keys, &value, Some(generation));
        Ok(value)
    }

    /// Paths revalidated since the last call, for a renderer to rebuild.
    pub fn take_stale_paths(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().stale_paths)
            .into_iter()
            .collect()
    }
}

impl Revalidator for MemoryCache {
    fn revalidate_key(&self, key: CacheKey) {
        let mut state = self.lock();
        state.generation += 1;
        state.entries.retain(|_, entry| !entry.keys.contains(&key));
        let CacheState { entries, order, .. } = &mut *state;
        order.retain(|name| entries.contains_key(name));
    }

    fn revalidate_path(&self, path: &str) {
        self.lock().stale_paths.insert(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Revalidator for Recorder {
        fn revalidate_key(&self, key: CacheKey) {
            self.events.lock().unwrap().push(format!("key:{}", key.as_str()));
        }

        fn revalidate_path(&self, path: &str) {
            self.events.lock().unwrap().push(format!("path:{path}"));
        }
    }

    fn coordinator(recorder: &Arc<Recorder>) -> CacheCoordinator {
        CacheCoordinator::new(vec!["/admin/photos".into(), "/admin/tags".into()])
            .with_revalidator(recorder.clone())
    }

    #[test]
    fn invalidate_all_covers_keys_admin_paths_and_root() {
        let recorder = Arc::new(Recorder::default());
        coordinator(&recorder).invalidate_all();
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "key:photos",
                "key:photo",
                "key:tags",
                "key:cameras",
                "key:film-simulations",
                "path:/admin/photos",
                "path:/admin/tags",
                "path:/",
            ]
        );
    }

    #[test]
    fn admin_views_only_touch_paths() {
        let recorder = Arc::new(Recorder::default());
        coordinator(&recorder).invalidate_admin_views();
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["path:/admin/photos", "path:/admin/tags"]);
    }

    #[test]
    fn key_revalidation_drops_tagged_entries() {
        let cache = MemoryCache::new();
        cache.put("photos:all", &[CacheKey::Photos], &vec![1, 2, 3]);
        cache.put("tags:visible", &[CacheKey::Photos, CacheKey::Tags], &vec!["a"]);
        cache.put("cameras:visible", &[CacheKey::Cameras], &vec!["x"]);

        cache.revalidate_key(CacheKey::Tags);
        assert!(cache.contains("photos:all"));
        assert!(!cache.contains("tags:visible"));

        cache.revalidate_key(CacheKey::Photos);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<Vec<String>>("cameras:visible"), Some(vec!["x".to_string()]));
    }

    #[test]
    fn paths_are_collected_once() {
        let cache = MemoryCache::new();
        cache.revalidate_path("/");
        cache.revalidate_path("/admin/photos");
        cache.revalidate_path("/");
        assert_eq!(cache.take_stale_paths(), vec!["/", "/admin/photos"]);
        assert!(cache.take_stale_paths().is_empty());
    }

    #[tokio::test]
    async fn get_or_load_caches_success_only() {
        let cache = MemoryCache::new();
        let v: i64 = cache.get_or_load("n", &[CacheKey::Photos], || async { Ok(7) }).await.unwrap();
        assert_eq!(v, 7);
        let v: i64 = cache
            .get_or_load("n", &[CacheKey::Photos], || async { Ok(8) })
            .await
            .unwrap();
        assert_eq!(v, 7);

        let err = cache
            .get_or_load::<i64, _, _>("e", &[CacheKey::Photos], || async {
                Err(crate::error::CatalogError::NotFound("x".into()))
            })
            .await;
        assert!(err.is_err());
        assert!(!cache.contains("e"));
    }

    #[tokio::test]
    async fn load_racing_an_invalidation_is_not_stored() {
        let cache = MemoryCache::new();
        let v: i64 = cache
            .get_or_load("n", &[CacheKey::Photos], || async {
                cache.revalidate_key(CacheKey::Photos);
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(v, 1);
        assert!(!cache.contains("n"));
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let cache = MemoryCache::with_capacity(2);
        cache.put("a", &[CacheKey::Photos], &1);
        cache.put("b", &[CacheKey::Tags], &2);
        cache.put("a", &[CacheKey::Photos], &3);
        cache.put("c", &[CacheKey::Photos], &4);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert_eq!(cache.get::<i64>("c"), Some(4));

        cache.revalidate_key(CacheKey::Photos);
        cache.put("d", &[CacheKey::Cameras], &5);
        assert!(cache.contains("b"));
        assert!(cache.contains("d"));
    }

    #[test]
    fn cache_key_names() {
        for key in CacheKey::ALL {
            assert_eq!(CacheKey::parse(key.as_str()), Some(key));
        }
    }
}
