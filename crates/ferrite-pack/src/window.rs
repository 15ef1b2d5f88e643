//! Shared byte-window and delta-base caches.
//!
//! Readers of streamed packs pull fixed-size windows of the underlying
//! file through a process-wide LRU; delta resolution keeps recently
//! reconstructed bases the same way. Both caches are striped: the key
//! hashes to one of several independently locked shards, so concurrent
//! readers rarely contend on the same mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ferrite_object::ObjectKind;
use lru::LruCache;

/// Size of one cached pack window.
pub const WINDOW_SIZE: usize = 1 << 20;
/// Default byte budget for the whole window cache.
pub const DEFAULT_WINDOW_BUDGET: usize = 32 << 20;
/// Default byte budget for reconstructed delta bases.
pub const DEFAULT_BASE_BUDGET: usize = 16 << 20;

const STRIPES: usize = 16;

static NEXT_PACK_ID: AtomicU64 = AtomicU64::new(1);

/// Hand out a unique id for a newly opened pack.
pub(crate) fn next_pack_id() -> u64 {
    NEXT_PACK_ID.fetch_add(1, Ordering::Relaxed)
}

struct Shard<V> {
    /// Values stored with their byte cost so eviction can account for them.
    entries: LruCache<(u64, u64), (V, usize)>,
    bytes: usize,
    budget: usize,
}

impl<V> Shard<V> {
    fn new(budget: usize) -> Self {
        Self {
            // Capacity is bounded by bytes, not entry count.
            entries: LruCache::unbounded(),
            bytes: 0,
            budget,
        }
    }
}

struct Striped<V> {
    shards: Vec<Mutex<Shard<V>>>,
}

impl<V: Clone> Striped<V> {
    fn new(total_budget: usize) -> Self {
        let per_shard = (total_budget / STRIPES).max(WINDOW_SIZE);
        Self {
            shards: (0..STRIPES)
                .map(|_| Mutex::new(Shard::new(per_shard)))
                .collect(),
        }
    }

    fn shard_for(&self, key: &(u64, u64)) -> &Mutex<Shard<V>> {
        let mix = key.0.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ key.1;
        &self.shards[(mix as usize) % STRIPES]
    }

    fn get(&self, key: &(u64, u64)) -> Option<V> {
        self.shard_for(key)
            .lock()
            .unwrap()
            .entries
            .get(key)
            .map(|(value, _)| value.clone())
    }

    fn put(&self, key: (u64, u64), value: V, cost: usize) {
        let mut shard = self.shard_for(&key).lock().unwrap();
        if cost > shard.budget {
            return; // larger than the whole shard; bypass the cache
        }
        if let Some((_, old_cost)) = shard.entries.put(key, (value, cost)) {
            shard.bytes = shard.bytes.saturating_sub(old_cost);
        }
        shard.bytes += cost;
        while shard.bytes > shard.budget {
            match shard.entries.pop_lru() {
                Some((_, (_, evicted_cost))) => {
                    shard.bytes = shard.bytes.saturating_sub(evicted_cost);
                }
                None => break,
            }
        }
    }

    fn evict_pack(&self, pack_id: u64) {
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap();
            let stale: Vec<(u64, u64)> = shard
                .entries
                .iter()
                .map(|(key, _)| *key)
                .filter(|key| key.0 == pack_id)
                .collect();
            for key in stale {
                if let Some((_, cost)) = shard.entries.pop(&key) {
                    shard.bytes = shard.bytes.saturating_sub(cost);
                }
            }
        }
    }
}

/// LRU over fixed-size byte windows of pack files, keyed by
/// `(pack id, window ordinal)`.
pub struct WindowCache {
    inner: Striped<Arc<Vec<u8>>>,
}

impl WindowCache {
    pub fn new(byte_budget: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Striped::new(byte_budget),
        })
    }

    pub fn get(&self, pack_id: u64, window: u64) -> Option<Arc<Vec<u8>>> {
        self.inner.get(&(pack_id, window))
    }

    pub fn put(&self, pack_id: u64, window: u64, bytes: Arc<Vec<u8>>) {
        let cost = bytes.len();
        self.inner.put((pack_id, window), bytes, cost);
    }

    /// Drop every window of a pack (after the pack is deleted or repacked).
    pub fn evict_pack(&self, pack_id: u64) {
        self.inner.evict_pack(pack_id);
    }
}

impl Default for WindowCache {
    fn default() -> Self {
        Self {
            inner: Striped::new(DEFAULT_WINDOW_BUDGET),
        }
    }
}

/// LRU over reconstructed delta bases, keyed by `(pack id, entry offset)`.
pub struct DeltaBaseCache {
    inner: Striped<Arc<(ObjectKind, Vec<u8>)>>,
}

impl DeltaBaseCache {
    pub fn new(byte_budget: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Striped::new(byte_budget),
        })
    }

    pub fn get(&self, pack_id: u64, offset: u64) -> Option<Arc<(ObjectKind, Vec<u8>)>> {
        self.inner.get(&(pack_id, offset))
    }

    pub fn put(&self, pack_id: u64, offset: u64, kind: ObjectKind, data: Vec<u8>) {
        let cost = data.len();
        self.inner.put((pack_id, offset), Arc::new((kind, data)), cost);
    }
}

impl Default for DeltaBaseCache {
    fn default() -> Self {
        Self {
            inner: Striped::new(DEFAULT_BASE_BUDGET),
        }
    }
}
