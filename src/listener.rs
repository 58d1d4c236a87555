use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::{mpsc, Notify};

use crate::event::EventRecord;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity for a listener, independent of its `Arc` address.
/// Assigned once at construction and used by the worker to find a
/// listener's entry in its active list on detach/unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A listener's delivery mode: exactly one of callback, bounded queue, or
/// task notification, fixed at construction. Tagged-enum dispatch replaces
/// the reference library's union-of-handles, making "more than one mode"
/// unrepresentable rather than merely unused (see `SPEC_FULL.md` ??4.4).
#[derive(Clone)]
pub enum DeliveryMode {
    Callback(Arc<dyn Fn(&EventRecord) + Send + Sync>),
    Queue(mpsc::Sender<EventRecord>),
    Notification(Arc<Notify>),
}

impl std::fmt::Debug for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Callback(_) => f.write_str("DeliveryMode::Callback"),
            DeliveryMode::Queue(tx) => f.debug_tuple("DeliveryMode::Queue").field(&tx.capacity()).finish(),
            DeliveryMode::Notification(_) => f.write_str("DeliveryMode::Notification"),
        }
    }
}

/// The producer-visible half of a listener: identity, delivery mode, and
/// the counters the worker updates during fan-out. The subscription bitmap
/// itself is worker-exclusive state and lives in the active-listener list
/// (see `worker::ActiveListener`), not here, since only the worker ever
/// reads or writes it.
pub struct ListenerShared {
    id: ListenerId,
    name: Option<String>,
    mode: DeliveryMode,
    overflow_flag: AtomicBool,
    ref_count: AtomicU32,
}

impl std::fmt::Debug for ListenerShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerShared")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("overflow", &self.overflow())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

impl ListenerShared {
    pub fn new(mode: DeliveryMode, name: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            mode,
            overflow_flag: AtomicBool::new(false),
            ref_count: AtomicU32::new(0),
        })
    }

    pub fn callback(f: impl Fn(&EventRecord) + Send + Sync + 'static, name: Option<String>) -> Arc<Self> {
        Self::new(DeliveryMode::Callback(Arc::new(f)), name)
    }

    pub fn queue(capacity: usize, name: Option<String>) -> (Arc<Self>, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(DeliveryMode::Queue(tx), name), rx)
    }

    pub fn notification(name: Option<String>) -> (Arc<Self>, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        (Self::new(DeliveryMode::Notification(notify.clone()), name), notify)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mode(&self) -> &DeliveryMode {
        &self.mode
    }

    /// Sticky flag set when a queued delivery could not be enqueued.
    /// Written only by the worker (or the ISR publish path); read
    /// unsynchronized elsewhere, tolerant of torn reads.
    pub fn overflow(&self) -> bool {
        self.overflow_flag.load(Ordering::Relaxed)
    }

    pub(crate) fn set_overflow(&self) {
        self.overflow_flag.store(true, Ordering::Relaxed);
    }

    /// Count of dynamic event records currently referenced in this
    /// listener's queue, diagnostic only.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn claim(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_claim(&self) {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "event_release: listener ref_count underflow");
    }
}
