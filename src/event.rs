use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use tracing::trace;

use crate::critical::CriticalSection;
use crate::error::{BusError, Result};
use crate::listener::ListenerShared;

/// An event identifier: a single integer naming a channel, not a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

/// Allocation class of an event record. Only non-static records
/// participate in reference counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationClass {
    Static,
    Dynamic { pool_index: usize },
}

impl AllocationClass {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, AllocationClass::Dynamic { .. })
    }
}

struct DynamicSlot {
    critical: Arc<CriticalSection>,
    pool_index: usize,
    block_index: usize,
}

struct EventInner {
    event: EventId,
    publisher_id: u16,
    allocation_class: AllocationClass,
    ref_count: AtomicU32,
    published: AtomicBool,
    // Stamped at publish entry into the worker (`mark_published`), not at
    // construction: a record can be built well before it is ever handed to
    // `Bus::publish`, and response-time stats must measure publish-to-release,
    // not alloc-to-release.
    publish_time: OnceLock<Instant>,
    payload: Vec<u8>,
    dynamic: Option<DynamicSlot>,
}

/// A published event: identifier, publisher tag, allocation class,
/// reference count, publish timestamp, and payload bytes.
///
/// Cloning an `EventRecord` is cheap (an `Arc` clone) and represents one
/// more "pointer to the event" in flight, matching the reference library's
/// pass-by-pointer semantics; the explicit `ref_count` field tracks bus-level
/// claims independently of Rust's own `Arc` strong count, since release and
/// pool-free decisions must be driven by explicit claim/release calls, not
/// by whichever handle happens to be dropped last.
#[derive(Clone)]
pub struct EventRecord {
    inner: Arc<EventInner>,
}

impl std::fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("event", &self.inner.event)
            .field("publisher_id", &self.inner.publisher_id)
            .field("allocation_class", &self.inner.allocation_class)
            .field("ref_count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

impl EventRecord {
    /// Build a static record. Static records are caller-owned: they never
    /// participate in reference counting or pool release, and are the only
    /// records a publish may retain.
    pub fn new_static(event: EventId, publisher_id: u16, payload: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                event,
                publisher_id,
                allocation_class: AllocationClass::Static,
                ref_count: AtomicU32::new(0),
                published: AtomicBool::new(false),
                publish_time: OnceLock::new(),
                payload,
                dynamic: None,
            }),
        }
    }

    pub(crate) fn new_dynamic(
        critical: Arc<CriticalSection>,
        pool_index: usize,
        block_index: usize,
        event: EventId,
        publisher_id: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            inner: Arc::new(EventInner {
                event,
                publisher_id,
                allocation_class: AllocationClass::Dynamic { pool_index },
                ref_count: AtomicU32::new(0),
                published: AtomicBool::new(false),
                publish_time: OnceLock::new(),
                payload,
                dynamic: Some(DynamicSlot { critical, pool_index, block_index }),
            }),
        }
    }

    pub fn id(&self) -> EventId {
        self.inner.event
    }

    pub fn publisher_id(&self) -> u16 {
        self.inner.publisher_id
    }

    pub fn allocation_class(&self) -> AllocationClass {
        self.inner.allocation_class
    }

    pub fn is_dynamic(&self) -> bool {
        self.inner.allocation_class.is_dynamic()
    }

    pub fn payload(&self) -> &[u8] {
        &self.inner.payload
    }

    /// The timestamp stamped at publish entry into the worker, or `None`
    /// if this record has never been published.
    pub fn publish_time(&self) -> Option<Instant> {
        self.inner.publish_time.get().copied()
    }

    pub fn ref_count(&self) -> u32 {
        self.inner.ref_count.load(Ordering::Acquire)
    }

    /// Called once, by `Worker::publish`, at publish entry: flips the
    /// diagnostic `published` flag and stamps `publish_time`.
    pub(crate) fn mark_published(&self) {
        self.inner.published.store(true, Ordering::Relaxed);
        let _ = self.inner.publish_time.set(Instant::now());
    }

    pub fn published(&self) -> bool {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Claim one more reference, taken pre-emptively before a queue-mode
    /// send so the record is never enqueue-visible with a zero count. Only
    /// meaningful for dynamic records; static records never reach zero and
    /// are never pool-freed.
    pub(crate) fn claim(&self) {
        if self.inner.dynamic.is_some() {
            self.inner.ref_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Undo a `claim()` that turned out not to be needed because the send
    /// it was taken for failed. Unlike `release`, this never frees the
    /// record even if the count falls to zero — the worker's post-fan-out
    /// unclaimed check (`free_if_unclaimed`) owns that decision.
    pub(crate) fn unclaim(&self) {
        if self.inner.dynamic.is_some() {
            let previous = self.inner.ref_count.fetch_sub(1, Ordering::AcqRel);
            assert!(previous > 0, "unclaim: ref_count underflow");
        }
    }

    /// Release one claim held on behalf of `listener`. Decrements both the
    /// record's and the listener's reference counts; when the record's
    /// count reaches zero, returns its block to the owning pool and folds
    /// its lifetime into that event id's response-time stats.
    pub fn release(&self, listener: &ListenerShared) -> Result<()> {
        let dynamic = self
            .inner
            .dynamic
            .as_ref()
            .ok_or_else(|| BusError::InvalidEventId(self.inner.event))?;

        let previous = self.inner.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "event_release: ref_count underflow");
        listener.release_claim();

        if previous == 1 {
            let published_at = self
                .inner
                .publish_time
                .get()
                .copied()
                .expect("event_release: record was delivered but never published");
            dynamic.critical.free_and_record(
                dynamic.pool_index,
                dynamic.block_index,
                self.inner.event,
                published_at,
            );
            trace!(event = self.inner.event.0, "dynamic event record freed");
        }
        Ok(())
    }

    /// Free this record immediately if it is dynamic and nothing claimed
    /// it during fan-out. Called by the worker after delivery, never by a
    /// listener (which goes through `release` instead). No subscriber ever
    /// saw this record, so unlike `release` it does not fold anything into
    /// the response-time stats — those measure publish-to-consumer-release,
    /// not publish-to-never-delivered.
    pub(crate) fn free_if_unclaimed(&self) {
        if let Some(dynamic) = &self.inner.dynamic {
            if self.inner.ref_count.load(Ordering::Acquire) == 0 {
                dynamic.critical.free(dynamic.pool_index, dynamic.block_index);
                trace!(event = self.inner.event.0, "unclaimed dynamic event freed after fan-out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;

    #[test]
    fn static_records_are_never_dynamic() {
        let record = EventRecord::new_static(EventId(1), 0, vec![1, 2, 3]);
        assert!(!record.is_dynamic());
        assert_eq!(record.ref_count(), 0);
    }

    #[test]
    fn dynamic_release_frees_pool_block_at_zero() {
        let critical = Arc::new(CriticalSection::new(&BusConfig::default()));
        let (pool_index, block_index, _) = critical.allocate(4).unwrap();
        let record = EventRecord::new_dynamic(critical.clone(), pool_index, block_index, EventId(1), 0, vec![9]);
        record.mark_published();

        let (listener, _rx) = ListenerShared::queue(1, None);
        record.claim();
        listener.claim();

        assert_eq!(record.ref_count(), 1);
        record.release(&listener).unwrap();
        assert_eq!(record.ref_count(), 0);
        assert!(critical.pool_integrity_all_valid());
    }

    #[test]
    fn free_if_unclaimed_returns_untouched_block_to_pool() {
        let critical = Arc::new(CriticalSection::new(&BusConfig::default()));
        let (pool_index, block_index, _) = critical.allocate(4).unwrap();
        let record = EventRecord::new_dynamic(critical.clone(), pool_index, block_index, EventId(1), 0, vec![9]);

        record.free_if_unclaimed();
        let info = critical.pool_info()[pool_index];
        assert_eq!(info.count, 0);
        assert_eq!(info.free_count, 1);
    }

    #[test]
    fn unclaim_undoes_a_speculative_claim_without_freeing() {
        let critical = Arc::new(CriticalSection::new(&BusConfig::default()));
        let (pool_index, block_index, _) = critical.allocate(4).unwrap();
        let record = EventRecord::new_dynamic(critical.clone(), pool_index, block_index, EventId(1), 0, vec![9]);

        record.claim();
        assert_eq!(record.ref_count(), 1);
        record.unclaim();
        assert_eq!(record.ref_count(), 0);

        // The block is still live: `unclaim` is not `release` and must not
        // free it, even though the count is back at zero. That decision
        // belongs to `free_if_unclaimed`.
        let info = critical.pool_info()[pool_index];
        assert_eq!(info.count, 1);
        assert_eq!(info.free_count, 0);
    }

    #[test]
    fn publish_time_is_unset_until_mark_published() {
        let record = EventRecord::new_static(EventId(1), 0, vec![1]);
        assert!(record.publish_time().is_none());
        record.mark_published();
        assert!(record.publish_time().is_some());
    }
}
