//! Fixed-block-size pool allocator.
//!
//! Mirrors `mem_pool.c`'s bump-then-freelist policy: a block is handed out
//! from the never-used region first, then from the free list, and only
//! fails once both are empty. The free list in the reference library links
//! through the first machine word of each freed block; here it is a typed
//! `Vec<usize>` stack of freed block indices, and payload bytes live in a
//! normal heap buffer rather than being sliced out of one arena.

use tracing::trace;

/// Snapshot of a pool's bookkeeping, analogous to `mp_info_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolInfo {
    pub block_size: usize,
    pub block_count: usize,
    pub count: usize,
    pub free_count: usize,
    pub high_water: usize,
}

struct PoolState {
    block_count: usize,
    next_unlinked: usize,
    free_list: Vec<usize>,
    count: usize,
    high_water: usize,
}

/// One fixed-block-size pool.
pub struct Pool {
    block_size: usize,
    state: PoolState,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("block_size", &self.block_size)
            .field("block_count", &self.state.block_count)
            .field("count", &self.state.count)
            .field("high_water", &self.state.high_water)
            .finish()
    }
}

impl Pool {
    /// Fails if `block_size` cannot hold a free-list link (a `usize`),
    /// mirroring `mp_init`'s rejection of undersized blocks.
    pub fn init(block_size: usize, block_count: usize) -> Option<Self> {
        if block_size < std::mem::size_of::<usize>() {
            return None;
        }
        Some(Self {
            block_size,
            state: PoolState {
                block_count,
                next_unlinked: 0,
                free_list: Vec::new(),
                count: 0,
                high_water: 0,
            },
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Allocate a block index, preferring the never-used region over the
    /// free list.
    pub fn allocate(&mut self) -> Option<usize> {
        let index = if self.state.next_unlinked < self.state.block_count {
            let idx = self.state.next_unlinked;
            self.state.next_unlinked += 1;
            idx
        } else {
            self.state.free_list.pop()?
        };
        self.state.count += 1;
        if self.state.count > self.state.high_water {
            self.state.high_water = self.state.count;
        }
        trace!(block_size = self.block_size, index, "pool block allocated");
        Some(index)
    }

    /// Return `index` to the free list. The caller guarantees it was
    /// produced by this pool and is not already free.
    pub fn free(&mut self, index: usize) {
        self.state.free_list.push(index);
        self.state.count -= 1;
        trace!(block_size = self.block_size, index, "pool block freed");
    }

    /// Walk the free list checking every link lies within the pool's
    /// index range, then verify the accounting identity. Returns `false`
    /// on either failure, mirroring `mp_integrity`.
    pub fn integrity(&self) -> (bool, PoolInfo) {
        let mut free_count = 0usize;
        for &idx in &self.state.free_list {
            if idx >= self.state.block_count {
                return (
                    false,
                    PoolInfo {
                        block_size: self.block_size,
                        block_count: self.state.block_count,
                        count: self.state.count,
                        free_count,
                        high_water: self.state.high_water,
                    },
                );
            }
            free_count += 1;
        }
        let unlinked_remaining = self.state.block_count - self.state.next_unlinked;
        let valid = self.state.block_count - self.state.count == free_count + unlinked_remaining;
        (
            valid,
            PoolInfo {
                block_size: self.block_size,
                block_count: self.state.block_count,
                count: self.state.count,
                free_count,
                high_water: self.state.high_water,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_blocks() {
        assert!(Pool::init(1, 4).is_none());
    }

    #[test]
    fn bump_then_freelist() {
        let mut pool = Pool::init(32, 2).unwrap();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert!(pool.allocate().is_none());
        pool.free(a);
        let (valid, info) = pool.integrity();
        assert!(valid);
        assert_eq!(info.count, 1);
        assert_eq!(info.free_count, 1);
        // Reuse comes from the free list now that the bump region is spent.
        let c = pool.allocate().unwrap();
        assert_eq!(c, a);
        let _ = b;
    }

    #[test]
    fn empty_pool_integrity() {
        let pool = Pool::init(32, 4).unwrap();
        let (valid, info) = pool.integrity();
        assert!(valid);
        assert_eq!(info.count, 0);
        assert_eq!(info.free_count, 0);
    }

    #[test]
    fn high_water_tracks_peak() {
        let mut pool = Pool::init(32, 4).unwrap();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.free(a);
        pool.free(b);
        let (_, info) = pool.integrity();
        assert_eq!(info.high_water, 2);
        assert_eq!(info.count, 0);
    }
}
