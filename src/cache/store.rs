//! Byte-budgeted LRU store for serialized render results.

use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;
use tracing::{debug, warn};

const TARGET: &str = "umlpipe::cache::store";

pub(crate) struct ValueStore {
    inner: Mutex<Inner>,
}

struct Inner {
    entries: LruCache<String, Bytes>,
    total_bytes: usize,
    max_bytes: usize,
}

impl ValueStore {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                // Eviction is driven by the byte budget, not entry count.
                entries: LruCache::unbounded(),
                total_bytes: 0,
                max_bytes,
            }),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Bytes> {
        self.lock().entries.get(key).cloned()
    }

    pub(crate) fn insert(&self, key: &str, value: Bytes) {
        let mut inner = self.lock();
        if value.len() > inner.max_bytes {
            warn!(
                target: TARGET,
                key,
                bytes = value.len(),
                max_bytes = inner.max_bytes,
                "render result larger than the whole cache, not storing"
            );
            return;
        }

        inner.total_bytes += value.len();
        if let Some(previous) = inner.entries.put(key.to_string(), value) {
            inner.total_bytes -= previous.len();
        }
        while inner.total_bytes > inner.max_bytes {
            let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes -= evicted.len();
            debug!(
                target: TARGET,
                key = %evicted_key,
                bytes = evicted.len(),
                "evicted least-recently-used entry"
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    target: TARGET,
                    "recovered from poisoned store lock, contents may be stale"
                );
                poisoned.into_inner()
            }
        }
    }
}
