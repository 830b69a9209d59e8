//! Page instance pool
//!
//! Page instances are expensive to assemble and hold mutable per-request
//! state, so each in-flight request checks out its own instance and hands
//! it back when done. Instances are keyed by canonical page name and locale.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Page, PageError, PageLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Idle instances kept per key once cleanup runs
    pub soft_limit: usize,
    /// Maximum instances checked out at once per key
    pub hard_limit: usize,
    /// Idle instances unused for longer than this are evicted
    pub active_window: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            soft_limit: 5,
            hard_limit: 20,
            active_window: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    page: String,
    locale: String,
}

struct IdlePage {
    page: Page,
    since: Instant,
}

#[derive(Default)]
struct PoolSlot {
    idle: Vec<IdlePage>,
    in_use: usize,
}

/// Snapshot of one pool key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
}

pub struct PagePool {
    loader: PageLoader,
    settings: PoolSettings,
    slots: Mutex<HashMap<PoolKey, PoolSlot>>,
}

impl std::fmt::Debug for PagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePool")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PagePool {
    pub fn new(loader: PageLoader, settings: PoolSettings) -> Self {
        Self {
            loader,
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &PageLoader {
        &self.loader
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PoolKey, PoolSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, name: &str, locale: &str) -> Result<PoolKey, PageError> {
        let canonical = self
            .loader
            .pages()
            .canonical_name(name)
            .ok_or_else(|| PageError::UnknownPage {
                name: name.to_string(),
            })?;
        Ok(PoolKey {
            page: canonical.to_string(),
            locale: locale.to_string(),
        })
    }

    /// Take an instance for exclusive use by one request
    pub fn checkout(&self, name: &str, locale: &str) -> Result<Page, PageError> {
        let key = self.key(name, locale)?;

        {
            let mut slots = self.slots();
            let slot = slots.entry(key.clone()).or_default();

            if let Some(idle) = slot.idle.pop() {
                slot.in_use += 1;
                drop(slots);
                let mut page = idle.page;
                page.attach();
                tracing::trace!(page = %key.page, instance = page.instance_id(), "Reusing pooled page");
                return Ok(page);
            }

            if slot.in_use >= self.settings.hard_limit {
                return Err(PageError::PoolExhausted {
                    page: key.page,
                    limit: self.settings.hard_limit,
                });
            }
            slot.in_use += 1;
        }

        match self.loader.load(&key.page, &key.locale) {
            Ok(mut page) => {
                page.attach();
                Ok(page)
            }
            Err(e) => {
                if let Some(slot) = self.slots().get_mut(&key) {
                    slot.in_use = slot.in_use.saturating_sub(1);
                }
                Err(e)
            }
        }
    }

    /// Return an instance at the end of a request
    ///
    /// A page still marked dirty may hold request state and is dropped
    /// instead of pooled.
    pub fn release(&self, mut page: Page) {
        let key = PoolKey {
            page: page.name().to_string(),
            locale: page.locale().to_string(),
        };

        if page.is_dirty() {
            tracing::warn!(
                page = %key.page,
                instance = page.instance_id(),
                dirty_count = page.dirty_count(),
                "Discarding dirty page instance instead of returning it to the pool"
            );
        } else {
            page.detach();
        }

        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();
        slot.in_use = slot.in_use.saturating_sub(1);
        if !page.is_dirty() {
            slot.idle.push(IdlePage {
                page,
                since: Instant::now(),
            });
        }
    }

    /// Evict idle instances past the active window or above the soft limit
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        let mut slots = self.slots();

        for (key, slot) in slots.iter_mut() {
            let before = slot.idle.len();
            slot.idle
                .retain(|idle| now.duration_since(idle.since) <= self.settings.active_window);
            // Most recently released instances sit at the end
            if slot.idle.len() > self.settings.soft_limit {
                let excess = slot.idle.len() - self.settings.soft_limit;
                slot.idle.drain(..excess);
            }
            let removed = before - slot.idle.len();
            if removed > 0 {
                tracing::debug!(page = %key.page, locale = %key.locale, removed, "Evicted idle pages");
            }
            evicted += removed;
        }

        slots.retain(|_, slot| slot.in_use > 0 || !slot.idle.is_empty());
        evicted
    }

    pub fn stats(&self, name: &str, locale: &str) -> PoolStats {
        let Ok(key) = self.key(name, locale) else {
            return PoolStats::default();
        };
        self.slots()
            .get(&key)
            .map(|slot| PoolStats {
                idle: slot.idle.len(),
                in_use: slot.in_use,
            })
            .unwrap_or_default()
    }
}

/// Pages checked out by one request, returned to the pool on drop
pub struct RequestPageCache<'a> {
    pool: &'a PagePool,
    locale: String,
    pages: HashMap<String, Page>,
}

impl<'a> RequestPageCache<'a> {
    pub fn new(pool: &'a PagePool, locale: &str) -> Self {
        Self {
            pool,
            locale: locale.to_string(),
            pages: HashMap::new(),
        }
    }

    /// The request's instance of the named page, checked out on first use
    pub fn get(&mut self, name: &str) -> Result<&mut Page, PageError> {
        let key = name.to_ascii_lowercase();
        match self.pages.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let page = self.pool.checkout(name, &self.locale)?;
                Ok(entry.insert(page))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl Drop for RequestPageCache<'_> {
    fn drop(&mut self) {
        for (_, page) in self.pages.drain() {
            self.pool.release(page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::page::{ComponentRegistry, PageDefinition, PageRegistry, Template};
    use std::sync::Arc;

    struct Plain;
    impl Component for Plain {}

    fn pool(settings: PoolSettings) -> PagePool {
        let mut pages = PageRegistry::new();
        pages.register(PageDefinition::new("Index", || Plain, Template::new().text("hi")));
        pages.register(PageDefinition::new("foo/Bar", || Plain, Template::new()));
        let loader = PageLoader::new(Arc::new(pages), Arc::new(ComponentRegistry::new()));
        PagePool::new(loader, settings)
    }

    #[test]
    fn test_clean_release_reuses_instance() {
        let pool = pool(PoolSettings::default());
        let first = pool.checkout("index", "en").unwrap();
        let id = first.instance_id();
        assert!(first.is_attached());
        pool.release(first);

        let second = pool.checkout("Index", "en").unwrap();
        assert_eq!(second.instance_id(), id);
    }

    #[test]
    fn test_dirty_release_discards_instance() {
        let pool = pool(PoolSettings::default());
        let mut first = pool.checkout("Index", "en").unwrap();
        let id = first.instance_id();
        first.increment_dirty_count();
        pool.release(first);

        assert_eq!(pool.stats("Index", "en"), PoolStats { idle: 0, in_use: 0 });
        let second = pool.checkout("Index", "en").unwrap();
        assert_ne!(second.instance_id(), id);
    }

    #[test]
    fn test_locales_are_separate_keys() {
        let pool = pool(PoolSettings::default());
        let en = pool.checkout("Index", "en").unwrap();
        let en_id = en.instance_id();
        pool.release(en);

        let fr = pool.checkout("Index", "fr").unwrap();
        assert_ne!(fr.instance_id(), en_id);
        assert_eq!(fr.locale(), "fr");
    }

    #[test]
    fn test_hard_limit() {
        let pool = pool(PoolSettings {
            hard_limit: 1,
            ..PoolSettings::default()
        });
        let held = pool.checkout("Index", "en").unwrap();
        let err = pool.checkout("Index", "en").unwrap_err();
        assert!(matches!(err, PageError::PoolExhausted { limit: 1, .. }));

        pool.release(held);
        assert!(pool.checkout("Index", "en").is_ok());
    }

    #[test]
    fn test_unknown_page() {
        let pool = pool(PoolSettings::default());
        assert!(matches!(
            pool.checkout("Missing", "en"),
            Err(PageError::UnknownPage { .. })
        ));
    }

    #[test]
    fn test_cleanup_applies_soft_limit_and_window() {
        let pool = pool(PoolSettings {
            soft_limit: 1,
            ..PoolSettings::default()
        });
        let a = pool.checkout("Index", "en").unwrap();
        let b = pool.checkout("Index", "en").unwrap();
        let c = pool.checkout("Index", "en").unwrap();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.stats("Index", "en").idle, 3);

        assert_eq!(pool.cleanup(), 2);
        assert_eq!(pool.stats("Index", "en").idle, 1);

        let expiring = pool_with_window(Duration::ZERO);
        let page = expiring.checkout("Index", "en").unwrap();
        expiring.release(page);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(expiring.cleanup(), 1);
    }

    fn pool_with_window(window: Duration) -> PagePool {
        pool(PoolSettings {
            active_window: window,
            ..PoolSettings::default()
        })
    }

    #[test]
    fn test_request_cache_releases_on_drop() {
        let pool = pool(PoolSettings::default());
        let id = {
            let mut cache = RequestPageCache::new(&pool, "en");
            let id = cache.get("foo/bar").unwrap().instance_id();
            // Same request, same instance
            assert_eq!(cache.get("FOO/BAR").unwrap().instance_id(), id);
            assert_eq!(pool.stats("foo/Bar", "en").in_use, 1);
            id
        };

        assert_eq!(pool.stats("foo/Bar", "en"), PoolStats { idle: 1, in_use: 0 });
        assert_eq!(pool.checkout("foo/Bar", "en").unwrap().instance_id(), id);
    }
}
