use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::error::ShadingError;
use crate::hash::Digest;
use crate::result::ShadingResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

type Slot = Arc<Mutex<Option<Arc<ShadingResult>>>>;

/// Bounded memo of shading results keyed by their input digest.
///
/// A key being computed owns a slot with its own lock. Callers requesting the
/// same key queue on that slot, so at most one computation runs per key.
/// Callers with different keys only share the short critical section that
/// looks up the slot. Slots live outside the LRU until their result is
/// stored, so eviction never drops a computation in progress. A failed
/// computation leaves the slot empty for the next caller.
pub struct ShadingCache {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheState {
    results: LruCache<Digest, Arc<ShadingResult>>,
    pending: HashMap<Digest, Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl ShadingCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                results: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_compute<F>(
        &self,
        key: Digest,
        compute: F,
    ) -> Result<Arc<ShadingResult>, ShadingError>
    where
        F: FnOnce() -> Result<ShadingResult, ShadingError>,
    {
        let slot = {
            let mut state = self.state();
            if let Some(result) = state.results.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(result));
            }
            Arc::clone(
                state
                    .pending
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(None))),
            )
        };

        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(result));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "computing shading result");
        match compute() {
            Ok(result) => {
                let result = Arc::new(result);
                *entry = Some(Arc::clone(&result));
                let mut state = self.state();
                state.results.put(key, Arc::clone(&result));
                state.pending.remove(&key);
                Ok(result)
            }
            Err(err) => {
                let mut state = self.state();
                // Callers already queued on this slot retry it; otherwise drop it.
                if Arc::strong_count(&slot) == 2 {
                    state.pending.remove(&key);
                }
                Err(err)
            }
        }
    }

    /// Returns the cached result for `key` without computing it.
    pub fn peek(&self, key: Digest) -> Option<Arc<ShadingResult>> {
        self.state().results.peek(&key).cloned()
    }

    pub fn clear(&self) {
        self.state().results.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.state().results.len(),
        }
    }
}

impl Default for ShadingCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}
