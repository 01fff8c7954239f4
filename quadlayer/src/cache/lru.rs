//! Byte-bounded LRU cache.
//!
//! Entries are kept in a doubly linked list ordered from most to least
//! recently used, with a hash index from key to list node. Nodes live in a
//! `Vec` and link to each other by position; removal swaps the last node
//! into the vacated slot and patches its neighbours.
//!
//! Each entry is weighed once, on insert or update, by a caller-supplied
//! weigher. The running total never exceeds the capacity after a mutating
//! call returns: least recently used entries are evicted one at a time until
//! it fits.
//!
//! The cache itself is not synchronised. Callers that share it across tasks
//! wrap it in a mutex and hold the lock only for the duration of a call.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::{debug, trace};

use super::CacheError;

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY_MB: usize = 2;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Computes the approximate in-memory size of a value, in bytes.
pub type Weigher<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;

/// Called with each entry removed to satisfy the capacity bound.
pub type EvictionListener<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

struct Entry<K, V> {
    key: K,
    value: V,
    size: usize,
    /// Neighbour towards the most recently used end
    newer: Option<usize>,
    /// Neighbour towards the least recently used end
    older: Option<usize>,
}

/// Counters and gauges describing an [`LruCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub size_bytes: usize,
    pub capacity_bytes: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fixed-capacity key/value store with least-recently-used eviction.
pub struct LruCache<K, V> {
    entries: Vec<Entry<K, V>>,
    index: HashMap<K, usize>,
    newest: Option<usize>,
    oldest: Option<usize>,
    size_bytes: usize,
    capacity_bytes: usize,
    weigher: Weigher<V>,
    eviction_listener: Option<EvictionListener<K, V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates a cache holding up to `capacity_mb` megabytes.
    ///
    /// # Arguments
    ///
    /// * `capacity_mb` - Capacity in megabytes (see [`DEFAULT_CAPACITY_MB`])
    /// * `weigher` - Returns the size in bytes charged for a value
    pub fn new<W>(capacity_mb: usize, weigher: W) -> Self
    where
        W: Fn(&V) -> usize + Send + Sync + 'static,
    {
        Self::with_capacity_bytes(capacity_mb.saturating_mul(BYTES_PER_MB), weigher)
    }

    /// Creates a cache holding up to `capacity_bytes` bytes.
    pub fn with_capacity_bytes<W>(capacity_bytes: usize, weigher: W) -> Self
    where
        W: Fn(&V) -> usize + Send + Sync + 'static,
    {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            newest: None,
            oldest: None,
            size_bytes: 0,
            capacity_bytes,
            weigher: Box::new(weigher),
            eviction_listener: None,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Registers a listener for capacity evictions.
    ///
    /// It is not called for [`delete`](Self::delete) or
    /// [`clear`](Self::clear).
    pub fn with_eviction_listener<L>(mut self, listener: L) -> Self
    where
        L: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.eviction_listener = Some(Box::new(listener));
        self
    }

    /// Inserts or replaces a value and marks it most recently used.
    ///
    /// A new key whose value alone is larger than the whole capacity is
    /// refused with [`CacheError::ValueTooLarge`] and the cache is left
    /// untouched. Replacing an existing key is never refused; if the new
    /// value does not fit, eviction may remove it again.
    pub fn set(&mut self, key: K, value: V) -> Result<(), CacheError> {
        let size = (self.weigher)(&value);

        if let Some(&idx) = self.index.get(&key) {
            let entry = &mut self.entries[idx];
            self.size_bytes = self.size_bytes - entry.size + size;
            entry.value = value;
            entry.size = size;
            self.promote(idx);
        } else {
            if size > self.capacity_bytes {
                return Err(CacheError::ValueTooLarge {
                    size,
                    max: self.capacity_bytes,
                });
            }
            let idx = self.entries.len();
            self.entries.push(Entry {
                key: key.clone(),
                value,
                size,
                newer: None,
                older: None,
            });
            self.index.insert(key, idx);
            self.link_newest(idx);
            self.size_bytes += size;
        }

        self.evict_to_capacity();
        Ok(())
    }

    /// Looks up a value and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.hits += 1;
                self.promote(idx);
                Some(&self.entries[idx].value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Looks up a value without changing its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&idx| &self.entries[idx].value)
    }

    /// Membership test without promotion.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Removes an entry. Returns whether the key was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.newest = None;
        self.oldest = None;
        self.size_bytes = 0;
    }

    /// Changes the capacity and immediately evicts down to it.
    pub fn set_capacity(&mut self, capacity_mb: usize) {
        self.set_capacity_bytes(capacity_mb.saturating_mul(BYTES_PER_MB));
    }

    /// Byte-granular variant of [`set_capacity`](Self::set_capacity).
    pub fn set_capacity_bytes(&mut self, capacity_bytes: usize) {
        self.capacity_bytes = capacity_bytes;
        self.evict_to_capacity();
    }

    /// Total size of all entries in bytes.
    pub fn size(&self) -> usize {
        self.size_bytes
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entry_count: self.entries.len(),
            size_bytes: self.size_bytes,
            capacity_bytes: self.capacity_bytes,
        }
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            entries: &self.entries,
            next: self.newest,
        }
    }

    fn evict_to_capacity(&mut self) {
        while self.size_bytes > self.capacity_bytes {
            let Some(idx) = self.oldest else {
                break;
            };
            let entry = self.remove_at(idx);
            self.evictions += 1;
            debug!(
                size = entry.size,
                cache_size = self.size_bytes,
                capacity = self.capacity_bytes,
                "Evicted least recently used entry"
            );
            if let Some(listener) = &self.eviction_listener {
                listener(&entry.key, &entry.value);
            }
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.newest == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_newest(idx);
        trace!(position = idx, "Promoted entry to most recently used");
    }

    fn link_newest(&mut self, idx: usize) {
        let previous = self.newest;
        {
            let entry = &mut self.entries[idx];
            entry.newer = None;
            entry.older = previous;
        }
        match previous {
            Some(prev) => self.entries[prev].newer = Some(idx),
            None => self.oldest = Some(idx),
        }
        self.newest = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (newer, older) = {
            let entry = &mut self.entries[idx];
            (entry.newer.take(), entry.older.take())
        };
        match newer {
            Some(n) => self.entries[n].older = older,
            None => self.newest = older,
        }
        match older {
            Some(o) => self.entries[o].newer = newer,
            None => self.oldest = newer,
        }
    }

    /// Unlinks and removes the node at `idx`, moving the last node into
    /// its slot.
    fn remove_at(&mut self, idx: usize) -> Entry<K, V> {
        self.unlink(idx);
        let entry = self.entries.swap_remove(idx);
        self.index.remove(&entry.key);
        self.size_bytes -= entry.size;

        if idx < self.entries.len() {
            let (newer, older) = (self.entries[idx].newer, self.entries[idx].older);
            match newer {
                Some(n) => self.entries[n].older = Some(idx),
                None => self.newest = Some(idx),
            }
            match older {
                Some(o) => self.entries[o].newer = Some(idx),
                None => self.oldest = Some(idx),
            }
            if let Some(slot) = self.index.get_mut(&self.entries[idx].key) {
                *slot = idx;
            }
        }

        entry
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("entries", &self.entries.len())
            .field("size_bytes", &self.size_bytes)
            .field("capacity_bytes", &self.capacity_bytes)
            .finish()
    }
}

/// Iterator over cache keys, most recently used first.
pub struct Keys<'a, K, V> {
    entries: &'a [Entry<K, V>],
    next: Option<usize>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let entry = &self.entries[idx];
        self.next = entry.older;
        Some(&entry.key)
    }
}
