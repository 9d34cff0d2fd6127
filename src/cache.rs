//! Block cache — a bounded, shared LRU-style cache of recently accessed
//! device blocks, consulted on every read and updated on every read-miss and
//! every write.
//!
//! The original C cache does a linear scan over every slot on every lookup.
//! This port indexes populated slots by [`BlockAddress`] in a `HashMap`
//! instead, so `get` is O(1), and only scans on `put` when the cache is
//! already full and a victim must be chosen — exactly the same situation the
//! original scans for, just not on every single lookup.

use std::collections::HashMap;

use log::debug;

use crate::device::{BlockAddress, BLOCK_SIZE};

struct CacheEntry {
    addr: BlockAddress,
    payload: Box<[u8]>,
    /// Monotonic counter assigned on every insert or update; the entry with
    /// the smallest `t` among populated slots is the LRU eviction victim.
    t: u32,
}

/// Fixed-capacity block cache, shared across all open files in a
/// [`crate::filesystem::Session`].
pub struct Cache {
    slots: Vec<Option<CacheEntry>>,
    index: HashMap<BlockAddress, usize>,
    max_blocks: usize,
    access_time: u32,
    hitc: u64,
    missc: u64,
}

impl Cache {
    pub fn new(max_blocks: usize) -> Self {
        let mut slots = Vec::with_capacity(max_blocks);
        slots.resize_with(max_blocks, || None);
        Self {
            slots,
            index: HashMap::with_capacity(max_blocks),
            max_blocks,
            access_time: 0,
            hitc: 0,
            missc: 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hitc
    }

    pub fn misses(&self) -> u64 {
        self.missc
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.hitc + self.missc;
        if total == 0 {
            return 0.0;
        }
        self.hitc as f64 / total as f64
    }

    /// Look up a block. Increments the hit or miss counter as a side effect.
    pub fn get(&mut self, addr: BlockAddress) -> Option<&[u8]> {
        match self.index.get(&addr) {
            Some(&slot) => {
                self.hitc += 1;
                let entry = self.slots[slot].as_ref().expect("index only points at populated slots");
                debug!("cache: hit for block {:?} (t={})", entry.addr, entry.t);
                Some(&entry.payload)
            }
            None => {
                self.missc += 1;
                debug!("cache: miss for block {addr:?}");
                None
            }
        }
    }

    /// Insert or update a block's payload.
    ///
    /// - If `addr` is already cached, its payload is overwritten in place
    ///   (no eviction).
    /// - Else if the cache is under capacity, a new slot is appended.
    /// - Else the slot with the smallest `t` is evicted, ties broken by the
    ///   lowest index.
    ///
    /// In every case the touched slot receives a fresh `t`.
    pub fn put(&mut self, addr: BlockAddress, payload: &[u8]) {
        debug_assert_eq!(payload.len(), BLOCK_SIZE);
        let t = self.access_time;
        self.access_time += 1;

        if let Some(&slot) = self.index.get(&addr) {
            let entry = self.slots[slot].as_mut().expect("index only points at populated slots");
            entry.payload.copy_from_slice(payload);
            entry.t = t;
            debug!("cache: updated block {addr:?} (t={t})");
            return;
        }

        let populated = self.index.len();
        let slot = if populated < self.max_blocks {
            self.slots.iter().position(|s| s.is_none()).expect("cache not at capacity")
        } else {
            let mut victim = 0usize;
            let mut victim_t = u32::MAX;
            for (i, entry) in self.slots.iter().enumerate() {
                if let Some(e) = entry {
                    if e.t < victim_t {
                        victim_t = e.t;
                        victim = i;
                    }
                }
            }
            let evicted_addr = self.slots[victim].as_ref().unwrap().addr;
            debug!("cache: evicting block {evicted_addr:?} (t={victim_t}) for {addr:?}");
            self.index.remove(&evicted_addr);
            victim
        };

        self.slots[slot] = Some(CacheEntry {
            addr,
            payload: payload.to_vec().into_boxed_slice(),
            t,
        });
        self.index.insert(addr, slot);
        debug!("cache: wrote block {addr:?} (t={t})");
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        debug!(
            "cache: closing — hits={} misses={} ratio={:.4}",
            self.hitc,
            self.missc,
            self.hit_ratio()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    fn addr(dev: u8, sec: u16, blk: u16) -> BlockAddress {
        BlockAddress { dev: DeviceId(dev), sec, blk }
    }

    fn block(fill: u8) -> Vec<u8> {
        vec![fill; BLOCK_SIZE]
    }

    #[test]
    fn miss_then_hit() {
        let mut c = Cache::new(2);
        assert!(c.get(addr(0, 0, 0)).is_none());
        c.put(addr(0, 0, 0), &block(1));
        assert_eq!(c.get(addr(0, 0, 0)).unwrap(), &block(1)[..]);
        assert_eq!(c.hits(), 1);
        assert_eq!(c.misses(), 1);
    }

    #[test]
    fn update_in_place_does_not_evict() {
        let mut c = Cache::new(1);
        c.put(addr(0, 0, 0), &block(1));
        c.put(addr(0, 0, 0), &block(2));
        assert_eq!(c.get(addr(0, 0, 0)).unwrap(), &block(2)[..]);
    }

    #[test]
    fn cold_start_eviction_picks_lowest_index_on_tie() {
        // All three puts happen without intervening gets, so all three
        // candidate slots race for distinct `t`s in insertion order; the
        // first two fill the cache, the third evicts whichever currently
        // has the smallest `t` — here that's slot 0 (oldest).
        let mut c = Cache::new(2);
        c.put(addr(0, 0, 0), &block(1)); // slot 0, t=0
        c.put(addr(0, 0, 1), &block(2)); // slot 1, t=1
        c.put(addr(0, 0, 2), &block(3)); // evicts t=0 → slot 0

        assert!(c.get(addr(0, 0, 0)).is_none(), "oldest entry must be evicted");
        assert!(c.get(addr(0, 0, 1)).is_some());
        assert!(c.get(addr(0, 0, 2)).is_some());
    }

    #[test]
    fn three_distinct_reads_cache_size_two_evicts_first() {
        // Cache size 2, read A, B, C in order; a subsequent read of A is a
        // miss because C's insert evicted it.
        let mut c = Cache::new(2);
        c.put(addr(0, 0, 0), &block(b'A'));
        c.put(addr(0, 0, 1), &block(b'B'));
        c.put(addr(0, 0, 2), &block(b'C'));
        assert!(c.get(addr(0, 0, 0)).is_none());
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let mut c = Cache::new(3);
        for i in 0..10u16 {
            c.put(addr(0, 0, i), &block(i as u8));
        }
        assert_eq!(c.index.len(), 3);
    }
}
