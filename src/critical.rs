//! The bus-wide critical section: pool allocate/free and reference-count
//! transitions that cross contexts (producer vs. worker) serialize here,
//! the way the reference library wraps them in `vTaskSuspendAll` /
//! `xTaskResumeAll`.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::event::EventId;
use crate::pool::{Pool, PoolInfo};

/// Per-event-id min/max latency between publish and final release.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseStats {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl ResponseStats {
    fn observe(&mut self, elapsed: Duration) {
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
    }
}

struct Inner {
    pools: Vec<Pool>,
    response_stats: Vec<ResponseStats>,
}

/// Shared state guarded by a single mutex, standing in for the reference
/// library's scheduler-suspend critical section.
pub struct CriticalSection {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CriticalSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticalSection").finish_non_exhaustive()
    }
}

impl CriticalSection {
    pub fn new(config: &BusConfig) -> Self {
        let pools = config
            .pool_classes
            .iter()
            .map(|class| {
                Pool::init(class.block_size, class.block_count)
                    .expect("pool class block size must hold a free-list link")
            })
            .collect();
        let response_stats = vec![ResponseStats::default(); config.event_count() as usize];
        Self { inner: Mutex::new(Inner { pools, response_stats }) }
    }

    /// Pick the smallest pool whose block size covers `size`, allocate a
    /// block from it, and return `(pool_index, block_index, block_size)`.
    pub fn allocate(&self, size: usize) -> Result<(usize, usize, usize)> {
        let mut inner = self.inner.lock();
        let largest = inner.pools.last().map(|p| p.block_size()).unwrap_or(0);
        let pool_index = inner
            .pools
            .iter()
            .position(|pool| pool.block_size() >= size)
            .ok_or(BusError::PayloadTooLarge { requested: size, largest })?;
        let block_size = inner.pools[pool_index].block_size();
        let block_index = inner.pools[pool_index]
            .allocate()
            .ok_or(BusError::PoolExhausted(size))?;
        Ok((pool_index, block_index, block_size))
    }

    /// Return a block to its pool with no response-time bookkeeping. Used
    /// when a dynamic record is freed without ever having been claimed by a
    /// listener — there is no consumer release to measure.
    pub fn free(&self, pool_index: usize, block_index: usize) {
        let mut inner = self.inner.lock();
        inner.pools[pool_index].free(block_index);
    }

    /// Return a block to its pool and fold its publish-to-release lifetime
    /// into that event id's response-time stats. Used only when a listener
    /// actually consumed the record (the last `event_release` on it).
    pub fn free_and_record(&self, pool_index: usize, block_index: usize, event: EventId, published_at: Instant) {
        let mut inner = self.inner.lock();
        inner.pools[pool_index].free(block_index);
        let stats = &mut inner.response_stats[event.0 as usize];
        stats.observe(published_at.elapsed());
    }

    pub fn pool_info(&self) -> Vec<PoolInfo> {
        let inner = self.inner.lock();
        inner.pools.iter().map(|pool| pool.integrity().1).collect()
    }

    pub fn pool_integrity_all_valid(&self) -> bool {
        let inner = self.inner.lock();
        inner.pools.iter().all(|pool| pool.integrity().0)
    }

    pub fn response_stats(&self, event: EventId) -> ResponseStats {
        self.inner.lock().response_stats[event.0 as usize]
    }

    pub fn all_response_stats(&self) -> Vec<ResponseStats> {
        self.inner.lock().response_stats.clone()
    }
}
