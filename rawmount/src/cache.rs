//! Bounded LRU cache of rendered DNG buffers with single-flight miss
//! coalescing.
//!
//! The first reader of a missing key becomes its producer; concurrent
//! readers attach to the pending slot and share the one result. Failures
//! are remembered briefly so an immediate retry storm cannot re-run a
//! producer that just died.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::VfsError;

/// Capacity and cooldown knobs, fixed at mount time.
#[derive(Debug, Clone)]
pub struct CacheParams {
    pub max_bytes: usize,
    pub max_entries: usize,
    pub failure_cooldown: Duration,
}

impl Default for CacheParams {
    fn default() -> Self {
        CacheParams {
            max_bytes: 1024 * 1024 * 1024,
            max_entries: 64,
            failure_cooldown: Duration::from_secs(5),
        }
    }
}

/// Cache identity of one synthetic entry: the owning directory, its config
/// generation, and the entry identity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dir: u64,
    pub generation: u64,
    pub entry: String,
}

/// Callback invoked with the produced buffer (or failure) for attached
/// readers, including the producer itself.
pub type Waiter = Box<dyn FnOnce(Result<Arc<Vec<u8>>, VfsError>) + Send>;

/// Outcome of a cache lookup that registers interest in the key.
pub enum Lookup {
    /// The buffer was ready; the waiter has already been invoked.
    Hit,
    /// Someone else is producing; the waiter runs when they finish.
    Attached,
    /// The caller owns production and must call `complete`.
    Owner,
    /// A recent failure is cooling down; the waiter was invoked with an
    /// error.
    CoolingDown,
}

enum Slot {
    Pending(Vec<Waiter>),
    Ready { buffer: Arc<Vec<u8>>, last_used: u64 },
    Failed(Instant),
}

struct Inner {
    slots: HashMap<CacheKey, Slot>,
    total_bytes: usize,
    ready_count: usize,
    tick: u64,
}

pub struct FrameCache {
    inner: Mutex<Inner>,
    params: CacheParams,
}

impl FrameCache {
    pub fn new(params: CacheParams) -> FrameCache {
        FrameCache {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                total_bytes: 0,
                ready_count: 0,
                tick: 0,
            }),
            params,
        }
    }

    /// Register interest in `key`. Exactly one concurrent caller per key is
    /// told it owns production; everyone else shares the result.
    pub fn begin(&self, key: CacheKey, waiter: Waiter) -> Lookup {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        match inner.slots.get_mut(&key) {
            Some(Slot::Ready { buffer, last_used }) => {
                *last_used = tick;
                let buffer = Arc::clone(buffer);
                drop(inner);
                waiter(Ok(buffer));
                Lookup::Hit
            }
            Some(Slot::Pending(waiters)) => {
                waiters.push(waiter);
                Lookup::Attached
            }
            Some(Slot::Failed(when)) => {
                if when.elapsed() < self.params.failure_cooldown {
                    drop(inner);
                    waiter(Err(VfsError::CoolingDown));
                    Lookup::CoolingDown
                } else {
                    inner.slots.insert(key, Slot::Pending(vec![waiter]));
                    Lookup::Owner
                }
            }
            None => {
                inner.slots.insert(key, Slot::Pending(vec![waiter]));
                Lookup::Owner
            }
        }
    }

    /// Publish the production result for `key` and fan it out to every
    /// attached waiter.
    pub fn complete(&self, key: &CacheKey, result: Result<Arc<Vec<u8>>, VfsError>) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let waiters = match inner.slots.remove(key) {
            Some(Slot::Pending(waiters)) => waiters,
            // A completion for an evicted or replaced slot still publishes
            other => {
                if let Some(slot) = other {
                    inner.unaccount(slot);
                }
                Vec::new()
            }
        };

        match &result {
            Ok(buffer) => {
                if buffer.len() <= self.params.max_bytes {
                    inner.total_bytes += buffer.len();
                    inner.ready_count += 1;
                    inner.slots.insert(
                        key.clone(),
                        Slot::Ready {
                            buffer: Arc::clone(buffer),
                            last_used: tick,
                        },
                    );
                    self.evict(&mut inner);
                }
                debug!(
                    bytes = inner.total_bytes,
                    entries = inner.ready_count,
                    "Cache published {}",
                    key.entry
                );
            }
            Err(e) => {
                debug!("Cache recording failure for {}: {e}", key.entry);
                inner.slots.insert(key.clone(), Slot::Failed(Instant::now()));
            }
        }

        drop(inner);
        for waiter in waiters {
            waiter(result.clone());
        }
    }

    /// Fetch a ready buffer without registering a producer.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<u8>>> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        match inner.slots.get_mut(key) {
            Some(Slot::Ready { buffer, last_used }) => {
                *last_used = tick;
                Some(Arc::clone(buffer))
            }
            _ => None,
        }
    }

    /// Drop everything, including failure markers. Pending slots survive so
    /// their producers can still complete.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner
            .slots
            .retain(|_, slot| matches!(slot, Slot::Pending(_)));
        inner.total_bytes = 0;
        inner.ready_count = 0;
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn ready_entries(&self) -> usize {
        self.inner.lock().ready_count
    }

    fn evict(&self, inner: &mut Inner) {
        while inner.total_bytes > self.params.max_bytes
            || inner.ready_count > self.params.max_entries
        {
            // Scan for the least recently used ready slot. The entry bound
            // is small, so a scan beats maintaining a chain.
            let victim = inner
                .slots
                .iter()
                .filter_map(|(k, slot)| match slot {
                    Slot::Ready { last_used, .. } => Some((*last_used, k.clone())),
                    _ => None,
                })
                .min_by_key(|(used, _)| *used)
                .map(|(_, k)| k);

            let Some(victim) = victim else {
                break;
            };
            let slot = inner.slots.remove(&victim).expect("victim exists");
            inner.unaccount(slot);
            debug!("Cache evicted {}", victim.entry);
        }
    }
}

impl Inner {
    fn unaccount(&mut self, slot: Slot) {
        if let Slot::Ready { buffer, .. } = slot {
            self.total_bytes -= buffer.len();
            self.ready_count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(name: &str) -> CacheKey {
        CacheKey {
            dir: 1,
            generation: 0,
            entry: name.to_string(),
        }
    }

    fn small_cache(max_bytes: usize, max_entries: usize) -> FrameCache {
        FrameCache::new(CacheParams {
            max_bytes,
            max_entries,
            failure_cooldown: Duration::from_secs(5),
        })
    }

    fn noop() -> Waiter {
        Box::new(|_| {})
    }

    #[test]
    fn test_first_caller_owns_production() {
        let cache = small_cache(1024, 8);
        assert!(matches!(cache.begin(key("a"), noop()), Lookup::Owner));
        assert!(matches!(cache.begin(key("a"), noop()), Lookup::Attached));
    }

    #[test]
    fn test_waiters_share_one_result() {
        let cache = small_cache(1024, 8);
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let hits = Arc::clone(&hits);
            cache.begin(
                key("a"),
                Box::new(move |result| {
                    assert_eq!(*result.unwrap(), vec![1, 2, 3]);
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        cache.complete(&key("a"), Ok(Arc::new(vec![1, 2, 3])));
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_ready_hit_invokes_immediately() {
        let cache = small_cache(1024, 8);
        cache.begin(key("a"), noop());
        cache.complete(&key("a"), Ok(Arc::new(vec![9; 10])));

        let hit = Arc::new(AtomicUsize::new(0));
        let hit2 = Arc::clone(&hit);
        let outcome = cache.begin(
            key("a"),
            Box::new(move |result| {
                assert_eq!(result.unwrap().len(), 10);
                hit2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(matches!(outcome, Lookup::Hit));
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_cooldown_blocks_retry() {
        let cache = small_cache(1024, 8);
        cache.begin(key("a"), noop());
        cache.complete(&key("a"), Err(VfsError::Decode("boom".into())));

        let outcome = cache.begin(
            key("a"),
            Box::new(|result| {
                assert_eq!(result.unwrap_err(), VfsError::CoolingDown);
            }),
        );
        assert!(matches!(outcome, Lookup::CoolingDown));
    }

    #[test]
    fn test_expired_cooldown_allows_retry() {
        let cache = FrameCache::new(CacheParams {
            max_bytes: 1024,
            max_entries: 8,
            failure_cooldown: Duration::ZERO,
        });
        cache.begin(key("a"), noop());
        cache.complete(&key("a"), Err(VfsError::Decode("boom".into())));

        assert!(matches!(cache.begin(key("a"), noop()), Lookup::Owner));
    }

    #[test]
    fn test_byte_bound_evicts_lru() {
        let cache = small_cache(25, 8);

        for name in ["a", "b", "c"] {
            cache.begin(key(name), noop());
            cache.complete(&key(name), Ok(Arc::new(vec![0; 10])));
        }
        // 30 bytes > 25: the oldest entry went
        assert_eq!(cache.ready_entries(), 2);
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let cache = small_cache(25, 8);

        for name in ["a", "b"] {
            cache.begin(key(name), noop());
            cache.complete(&key(name), Ok(Arc::new(vec![0; 10])));
        }
        // Touch "a" so "b" becomes the LRU
        assert!(cache.get(&key("a")).is_some());

        cache.begin(key("c"), noop());
        cache.complete(&key("c"), Ok(Arc::new(vec![0; 10])));

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_entry_count_bound() {
        let cache = small_cache(1024, 2);
        for name in ["a", "b", "c", "d"] {
            cache.begin(key(name), noop());
            cache.complete(&key(name), Ok(Arc::new(vec![0; 1])));
        }
        assert_eq!(cache.ready_entries(), 2);
    }

    #[test]
    fn test_oversized_buffer_not_cached_but_delivered() {
        let cache = small_cache(10, 8);
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&delivered);

        cache.begin(
            key("big"),
            Box::new(move |result| {
                assert_eq!(result.unwrap().len(), 100);
                d.fetch_add(1, Ordering::SeqCst);
            }),
        );
        cache.complete(&key("big"), Ok(Arc::new(vec![0; 100])));

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(cache.ready_entries(), 0);
    }

    #[test]
    fn test_clear_resets_failures_and_buffers() {
        let cache = small_cache(1024, 8);
        cache.begin(key("a"), noop());
        cache.complete(&key("a"), Err(VfsError::Decode("x".into())));
        cache.begin(key("b"), noop());
        cache.complete(&key("b"), Ok(Arc::new(vec![0; 4])));

        cache.clear();
        assert_eq!(cache.total_bytes(), 0);
        // Failure marker gone: the next reader owns production again
        assert!(matches!(cache.begin(key("a"), noop()), Lookup::Owner));
    }

    #[test]
    fn test_generation_change_separates_keys() {
        let cache = small_cache(1024, 8);
        cache.begin(key("a"), noop());
        cache.complete(&key("a"), Ok(Arc::new(vec![1])));

        let stale = CacheKey {
            generation: 1,
            ..key("a")
        };
        assert!(cache.get(&stale).is_none());
        assert!(matches!(cache.begin(stale, noop()), Lookup::Owner));
    }
}
