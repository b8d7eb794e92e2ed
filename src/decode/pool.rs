//! Reusable pixel buffer pool.
//!
//! Every buffer the pool hands out is registered as a [`PoolEntry`]. An entry
//! is either free (its allocation sits in the pool) or lent (its allocation
//! is owned by exactly one decode attempt or decoded image). Lent entries are
//! never evicted; free entries are evicted least-recently-freed first once the
//! pool exceeds its byte or entry budget.
//!
//! A lent [`PixelBuffer`] carries a lease back to its entry. Dropping the
//! buffer returns the allocation to the pool that lent it, so a discarded
//! result never keeps its entry lent.
//!
//! # Locking
//!
//! The entry table sits behind a single mutex. The lock is held only while the
//! table is updated; allocating and filling pixel memory happen outside it.
//! No [`PixelBuffer`] is ever dropped while the lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use lru::LruCache;
use tracing::{debug, warn};

use super::types::{PixelBuffer, PixelFormat};

/// Default byte budget for pooled buffers: 32MB
pub const DEFAULT_POOL_MAX_BYTES: usize = 32 * 1024 * 1024;

/// Default maximum number of pool entries
pub const DEFAULT_POOL_MAX_ENTRIES: usize = 64;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Pool Entry
// =============================================================================

/// Allocation size and layout of a pooled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeClass {
    pub format: PixelFormat,
    pub capacity: usize,
}

#[derive(Debug)]
struct PoolEntry {
    size_class: SizeClass,
    /// `None` while the buffer is lent out
    buffer: Option<Vec<u8>>,
}

impl PoolEntry {
    fn in_use(&self) -> bool {
        self.buffer.is_none()
    }
}

/// Counters describing pool effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquires served from a free entry
    pub hits: u64,
    /// Acquires that found nothing suitable
    pub misses: u64,
    /// Fresh allocations registered with the pool
    pub allocations: u64,
    /// Fresh allocations the pool had no room to track
    pub unpooled: u64,
    /// Free entries dropped to stay within budget
    pub evictions: u64,
    /// Releases of buffers the pool did not own
    pub rejected_releases: u64,
}

struct PoolTable {
    entries: HashMap<u64, PoolEntry>,
    /// Free slots, least recently freed first
    free_order: LruCache<u64, ()>,
    next_slot: u64,
    total_bytes: usize,
    stats: PoolStats,
}

impl PoolTable {
    fn evict_oldest_free(&mut self) -> bool {
        match self.free_order.pop_lru() {
            Some((slot, _)) => {
                if let Some(entry) = self.entries.remove(&slot) {
                    self.total_bytes = self.total_bytes.saturating_sub(entry.size_class.capacity);
                    self.stats.evictions += 1;
                    debug!(
                        slot = slot,
                        capacity = entry.size_class.capacity,
                        format = entry.size_class.format.name(),
                        "Evicted pooled buffer"
                    );
                }
                true
            }
            None => false,
        }
    }
}

/// State shared between a pool and the leases of its lent buffers.
struct PoolShared {
    id: u64,
    table: Mutex<PoolTable>,
    max_bytes: usize,
    max_entries: usize,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolTable> {
        // The table stays consistent across every early return, so a
        // poisoned lock is still safe to use.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a lent allocation back into its entry.
    fn restore(&self, slot: u64, data: Vec<u8>, format: PixelFormat) {
        let mut table = self.lock();

        let accepted = match table.entries.get_mut(&slot) {
            Some(entry) if entry.in_use() => {
                let class = entry.size_class;
                if class.format == format && class.capacity == data.len() {
                    entry.buffer = Some(data);
                    true
                } else {
                    false
                }
            }
            _ => false,
        };

        if !accepted {
            table.stats.rejected_releases += 1;
            warn!(slot = slot, "Released buffer does not match a lent pool entry, dropping it");
            return;
        }

        table.free_order.put(slot, ());

        while table.total_bytes > self.max_bytes {
            if !table.evict_oldest_free() {
                break;
            }
        }
    }
}

// =============================================================================
// Pool Lease
// =============================================================================

/// Link from a lent buffer back to the entry it was lent from.
#[derive(Debug)]
pub(crate) struct PoolLease {
    pool: Weak<PoolShared>,
    pool_id: u64,
    slot: u64,
}

impl PoolLease {
    pub(crate) fn slot(&self) -> u64 {
        self.slot
    }

    /// Hand the allocation back to the lending pool. A pool that no longer
    /// exists simply lets the memory go.
    pub(crate) fn give_back(self, data: Vec<u8>, format: PixelFormat) {
        if let Some(shared) = self.pool.upgrade() {
            shared.restore(self.slot, data, format);
        }
    }
}

// =============================================================================
// Buffer Pool
// =============================================================================

/// Capacity-bounded store of reusable pixel buffers.
///
/// # Example
///
/// ```
/// use bitmap_decode::decode::{BufferPool, PixelFormat};
///
/// let pool = BufferPool::new();
///
/// // Nothing to reuse yet, so allocate and register a new buffer
/// assert!(pool.acquire(64, 64, PixelFormat::Rgba8).is_none());
/// let buffer = pool.allocate(64, 64, PixelFormat::Rgba8);
///
/// // Returning it makes it available to the next decode
/// pool.release(buffer);
/// assert!(pool.acquire(32, 32, PixelFormat::Rgba8).is_some());
/// ```
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool with the default budget (32MB, 64 entries).
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_POOL_MAX_BYTES, DEFAULT_POOL_MAX_ENTRIES)
    }

    /// Create a pool with custom byte and entry budgets.
    pub fn with_limits(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                table: Mutex::new(PoolTable {
                    entries: HashMap::new(),
                    free_order: LruCache::unbounded(),
                    next_slot: 0,
                    total_bytes: 0,
                    stats: PoolStats::default(),
                }),
                max_bytes,
                max_entries,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolTable> {
        self.shared.lock()
    }

    fn lease(&self, slot: u64) -> PoolLease {
        PoolLease {
            pool: Arc::downgrade(&self.shared),
            pool_id: self.shared.id,
            slot,
        }
    }

    /// Borrow a free buffer able to hold a `width` x `height` frame.
    ///
    /// Among free entries of the same format with enough capacity, the
    /// smallest one is chosen. Returns `None` when nothing qualifies; the
    /// caller then allocates fresh memory.
    pub fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer> {
        let required = format.byte_size(width, height);
        if required == 0 {
            return None;
        }

        let mut table = self.lock();

        let best = table
            .free_order
            .iter()
            .filter_map(|(slot, _)| {
                let entry = table.entries.get(slot)?;
                let class = entry.size_class;
                (class.format == format && class.capacity >= required)
                    .then_some((*slot, class.capacity))
            })
            .min_by_key(|&(_, capacity)| capacity)
            .map(|(slot, _)| slot);

        let Some(slot) = best else {
            table.stats.misses += 1;
            return None;
        };

        table.free_order.pop(&slot);
        let data = table
            .entries
            .get_mut(&slot)
            .and_then(|entry| entry.buffer.take());

        match data {
            Some(data) => {
                table.stats.hits += 1;
                Some(PixelBuffer::pooled(data, format, self.lease(slot)))
            }
            None => {
                // Free order and entry table disagree; drop the stale slot.
                table.entries.remove(&slot);
                table.stats.misses += 1;
                None
            }
        }
    }

    /// Allocate a new buffer and register it with the pool.
    ///
    /// Free entries are evicted to make room. When the pool cannot make room
    /// because every entry is lent, the buffer is returned unpooled.
    pub fn allocate(&self, width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        let capacity = format.byte_size(width, height);
        let data = vec![0u8; capacity];

        let (max_bytes, max_entries) = (self.shared.max_bytes, self.shared.max_entries);
        if capacity == 0 || capacity > max_bytes || max_entries == 0 {
            self.lock().stats.unpooled += 1;
            return PixelBuffer::with_data(data, format);
        }

        let mut table = self.lock();
        while table.entries.len() >= max_entries || table.total_bytes + capacity > max_bytes {
            if !table.evict_oldest_free() {
                break;
            }
        }

        if table.entries.len() >= max_entries || table.total_bytes + capacity > max_bytes {
            table.stats.unpooled += 1;
            debug!(
                capacity = capacity,
                entries = table.entries.len(),
                "Buffer pool full of lent entries, allocating unpooled buffer"
            );
            return PixelBuffer::with_data(data, format);
        }

        let slot = table.next_slot;
        table.next_slot += 1;
        table.entries.insert(
            slot,
            PoolEntry {
                size_class: SizeClass { format, capacity },
                buffer: None,
            },
        );
        table.total_bytes += capacity;
        table.stats.allocations += 1;

        PixelBuffer::pooled(data, format, self.lease(slot))
    }

    /// Return a lent buffer to the pool.
    ///
    /// Dropping a lent buffer has the same effect. Unpooled buffers are
    /// dropped with a warning; a buffer lent by another pool is counted as
    /// rejected here and goes back to the pool that lent it.
    pub fn release(&self, buffer: PixelBuffer) {
        let (data, format, lease) = buffer.into_parts();

        let Some(lease) = lease else {
            self.lock().stats.rejected_releases += 1;
            warn!(
                capacity = data.len(),
                format = format.name(),
                "Released buffer is not owned by the pool, dropping it"
            );
            return;
        };

        if lease.pool_id != self.shared.id {
            self.lock().stats.rejected_releases += 1;
            warn!(
                slot = lease.slot,
                "Released buffer was lent by another pool, returning it there"
            );
            lease.give_back(data, format);
            return;
        }

        self.shared.restore(lease.slot, data, format);
    }

    /// Drop every free entry. Lent entries are untouched.
    pub fn clear(&self) {
        let mut table = self.lock();
        while table.evict_oldest_free() {}
    }

    /// Evict free entries until at most `max_bytes` are pooled.
    pub fn trim_to(&self, max_bytes: usize) {
        let mut table = self.lock();
        while table.total_bytes > max_bytes {
            if !table.evict_oldest_free() {
                break;
            }
        }
    }

    /// Size classes of the free entries, sorted.
    pub fn free_entries(&self) -> Vec<SizeClass> {
        let table = self.lock();
        let mut classes: Vec<SizeClass> = table
            .entries
            .values()
            .filter(|entry| !entry.in_use())
            .map(|entry| entry.size_class)
            .collect();
        classes.sort_by_key(|c| (c.format.name(), c.capacity));
        classes
    }

    /// Number of entries currently lent out.
    pub fn lent_count(&self) -> usize {
        let table = self.lock();
        table.entries.values().filter(|e| e.in_use()).count()
    }

    /// Total number of registered entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by registered entries, free or lent.
    pub fn size(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }

    pub fn max_bytes(&self) -> usize {
        self.shared.max_bytes
    }

    pub fn max_entries(&self) -> usize {
        self.shared.max_entries
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
