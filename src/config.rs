//! Compile-time-style parameters for a [`crate::Bus`].
//!
//! The reference library expresses these as preprocessor `#define`s
//! (`EVENT_BUS_MASK_WIDTH`, pool block sizes, pipeline depth, ...) fixed at
//! build time. This target has no preprocessor, so they are gathered into a
//! single struct passed to [`crate::Bus::init`].

/// Size, in bytes, of an `u32` subscription mask word.
pub const MASK_WORD_BITS: u32 = 32;

/// One size class backing the pool allocator.
#[derive(Debug, Clone, Copy)]
pub struct PoolClass {
    pub block_size: usize,
    pub block_count: usize,
}

/// Bus-wide configuration, analogous to the reference library's compile-time
/// parameters.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Number of mask words; the number of representable event ids is
    /// `mask_width * MASK_WORD_BITS`.
    pub mask_width: u32,
    /// Depth of the bounded command pipeline.
    pub pipeline_depth: usize,
    /// Pool size classes, smallest first. `event_alloc` picks the first
    /// class whose `block_size` fits the requested payload.
    pub pool_classes: Vec<PoolClass>,
    /// Whether a notification slot is available for `wait_event` and
    /// notification-mode listeners. Mirrors
    /// `EVENT_BUS_USE_TASK_NOTIFICATION_INDEX` in the reference library.
    pub notification_slot: bool,
}

impl BusConfig {
    /// Number of representable event ids.
    pub fn event_count(&self) -> u32 {
        self.mask_width * MASK_WORD_BITS
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mask_width: 3,
            pipeline_depth: 32,
            pool_classes: vec![
                PoolClass { block_size: 32, block_count: 16 },
                PoolClass { block_size: 128, block_count: 8 },
                PoolClass { block_size: 512, block_count: 4 },
            ],
            notification_slot: true,
        }
    }
}
