//! Bounded cache of decoded tiles.
//!
//! Off-screen tiles live in a [`moka`] cache with a plain LRU policy. The weigher
//! charges every tile its share of both the tile-count and the byte budget, so the
//! cache stays within whichever limit is tighter. Tiles pinned as on-screen are
//! moved out of the LRU into a side table and can never be evicted.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use super::TileDescriptor;

/// Decoded RGBA tile raster.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels
    pub pixels: Arc<[u8]>,
}

impl TileImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Memory charged against the cache budget.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Weight of a tile in units where `max_tiles` is the total capacity.
///
/// Each tile weighs at least one slot, and at least its fraction of the byte budget.
fn tile_weight(bytes: usize, max_tiles: usize, max_bytes: usize) -> u32 {
    let scaled = (bytes as u128 * max_tiles as u128).div_ceil(max_bytes.max(1) as u128);
    scaled.clamp(1, u32::MAX as u128) as u32
}

/// LRU tile cache keyed by descriptor.
pub struct TileCache {
    lru: Cache<TileDescriptor, TileImage>,
    /// On-screen tiles currently held outside the LRU
    held: HashMap<TileDescriptor, TileImage>,
    pinned: HashSet<TileDescriptor>,
    evictions: Arc<AtomicU64>,
}

impl TileCache {
    pub fn new(max_tiles: usize, max_bytes: usize) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evictions);
        let lru = Cache::builder()
            .max_capacity(max_tiles as u64)
            .weigher(move |_tile: &TileDescriptor, image: &TileImage| {
                tile_weight(image.byte_size(), max_tiles, max_bytes)
            })
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |tile: Arc<TileDescriptor>, _image: TileImage, cause: RemovalCause| {
                if cause == RemovalCause::Size {
                    counter.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Evicted tile {} from cache", tile);
                }
            })
            .build();
        Self {
            lru,
            held: HashMap::new(),
            pinned: HashSet::new(),
            evictions,
        }
    }

    pub fn len(&self) -> usize {
        self.held.len() + self.lru.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of pixel data currently held.
    pub fn bytes(&self) -> usize {
        let held: usize = self.held.values().map(TileImage::byte_size).sum();
        let cached: usize = self.lru.iter().map(|(_, image)| image.byte_size()).sum();
        held + cached
    }

    /// Total entries evicted since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Presence check. Does not count as a use.
    pub fn contains(&self, tile: &TileDescriptor) -> bool {
        self.held.contains_key(tile) || self.lru.contains_key(tile)
    }

    /// Look up a tile and mark it as recently used.
    pub fn get(&self, tile: &TileDescriptor) -> Option<TileImage> {
        match self.held.get(tile) {
            Some(image) => Some(image.clone()),
            None => self.lru.get(tile),
        }
    }

    /// Insert or replace a tile, then evict down to budget.
    pub fn insert(&mut self, tile: TileDescriptor, image: TileImage) {
        if self.pinned.contains(&tile) {
            self.held.insert(tile, image);
            self.lru.invalidate(&tile);
        } else {
            self.lru.insert(tile, image);
        }
        self.lru.run_pending_tasks();
    }

    /// Replace the on-screen set. Pinned tiles are exempt from eviction.
    pub fn set_pinned(&mut self, tiles: impl IntoIterator<Item = TileDescriptor>) {
        self.pinned = tiles.into_iter().collect();

        let released: Vec<TileDescriptor> = self
            .held
            .keys()
            .filter(|tile| !self.pinned.contains(*tile))
            .copied()
            .collect();
        for tile in released {
            if let Some(image) = self.held.remove(&tile) {
                self.lru.insert(tile, image);
            }
        }
        for tile in &self.pinned {
            if let Some(image) = self.lru.remove(tile) {
                self.held.insert(*tile, image);
            }
        }
        self.lru.run_pending_tasks();
    }

    pub fn is_pinned(&self, tile: &TileDescriptor) -> bool {
        self.pinned.contains(tile)
    }

    /// Drop every entry and pin.
    pub fn clear(&mut self) {
        let count = self.len();
        self.held.clear();
        self.pinned.clear();
        self.lru.invalidate_all();
        self.lru.run_pending_tasks();
        if count > 0 {
            log::info!("Cleared tile cache ({} entries)", count);
        }
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("cached", &self.lru.entry_count())
            .field("held", &self.held.len())
            .field("pinned", &self.pinned.len())
            .field("evictions", &self.evictions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bytes: usize) -> TileImage {
        TileImage::new(1, 1, vec![0; bytes])
    }

    fn tile(col: u32) -> TileDescriptor {
        TileDescriptor::new(0, col, 0)
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = TileCache::new(2, usize::MAX);
        cache.insert(tile(0), image(4));
        cache.insert(tile(1), image(4));
        // Touch tile 0 so tile 1 becomes the oldest
        assert!(cache.get(&tile(0)).is_some());
        cache.insert(tile(2), image(4));

        assert!(cache.contains(&tile(0)));
        assert!(!cache.contains(&tile(1)));
        assert!(cache.contains(&tile(2)));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_pinned_tiles_survive() {
        let mut cache = TileCache::new(1, usize::MAX);
        cache.insert(tile(0), image(4));
        cache.set_pinned([tile(0)]);
        cache.insert(tile(1), image(4));
        cache.insert(tile(2), image(4));

        // The on-screen tile is held; the off-screen budget of one keeps the newest
        assert!(cache.contains(&tile(0)));
        assert!(!cache.contains(&tile(1)));
        assert!(cache.contains(&tile(2)));
        assert_eq!(cache.len(), 2);

        // A tile inserted while pinned goes straight to the held side
        cache.set_pinned([tile(0), tile(3)]);
        cache.insert(tile(3), image(4));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_unpinned_tiles_become_evictable() {
        let mut cache = TileCache::new(1, usize::MAX);
        cache.set_pinned([tile(0), tile(1)]);
        cache.insert(tile(0), image(4));
        cache.insert(tile(1), image(4));
        assert_eq!(cache.len(), 2);

        cache.set_pinned(std::iter::empty());
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_pinned(&tile(0)));
    }

    #[test]
    fn test_byte_budget() {
        let mut cache = TileCache::new(100, 10);
        cache.insert(tile(0), image(6));
        cache.insert(tile(1), image(6));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 6);
        assert!(cache.contains(&tile(1)));
    }

    #[test]
    fn test_replace_updates_bytes() {
        let mut cache = TileCache::new(10, 100);
        cache.insert(tile(0), image(6));
        cache.insert(tile(0), image(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 2);
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_contains_does_not_touch() {
        let mut cache = TileCache::new(2, usize::MAX);
        cache.insert(tile(0), image(1));
        cache.insert(tile(1), image(1));
        assert!(cache.contains(&tile(0)));
        cache.insert(tile(2), image(1));
        assert!(!cache.contains(&tile(0)));
    }

    #[test]
    fn test_weight_covers_both_budgets() {
        assert_eq!(tile_weight(4, 2, usize::MAX), 1);
        assert_eq!(tile_weight(6, 100, 10), 60);
        assert_eq!(tile_weight(0, 8, 64), 1);
    }
}
