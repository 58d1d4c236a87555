use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::command::{Command, CommandAck};
use crate::config::BusConfig;
use crate::critical::CriticalSection;
use crate::delivery;
use crate::diagnostics::ListenerSnapshot;
use crate::error::{BusError, Result};
use crate::event::{EventId, EventRecord};
use crate::listener::ListenerShared;
use crate::worker::Worker;

/// Handle to a running event bus. Cloning a `Bus` is cheap and yields
/// another handle to the same worker and pool set, the way
/// `JobQueueHandle` in the reference codebase wraps its channel senders.
#[derive(Clone)]
pub struct Bus {
    command_tx: mpsc::Sender<(Command, CommandAck)>,
    pub(crate) snapshot_tx: mpsc::Sender<oneshot::Sender<ListenerSnapshot>>,
    pub(crate) critical: Arc<CriticalSection>,
    config: Arc<BusConfig>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("mask_width", &self.config.mask_width)
            .field("pipeline_depth", &self.config.pipeline_depth)
            .finish_non_exhaustive()
    }
}

impl Bus {
    /// Start the worker task and return a handle to it.
    pub fn init(config: BusConfig) -> Self {
        let critical = Arc::new(CriticalSection::new(&config));
        let (command_tx, command_rx) = mpsc::channel(config.pipeline_depth);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(config.pipeline_depth);

        let worker = Worker::new(&config);
        tokio::spawn(worker.run(command_rx, snapshot_rx));

        Self {
            command_tx,
            snapshot_tx,
            critical,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn check_id(&self, id: EventId) -> Result<()> {
        if id.0 >= self.config.event_count() {
            Err(BusError::InvalidEventId(id))
        } else {
            Ok(())
        }
    }

    /// Send a command and wait for the worker's acknowledgement, the task
    /// producer path. Blocks on the send if the pipeline is full, bounded
    /// only by the channel's own backpressure (an infinite wait, per
    /// section 4.6, unless the caller uses `send_timeout` via a more
    /// specific entry point).
    async fn submit(&self, command: Command) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send((command, Some(ack_tx)))
            .await
            .map_err(|_| BusError::PipelineClosed)?;
        ack_rx.await.map_err(|_| BusError::PipelineClosed)
    }

    pub async fn attach(&self, listener: Arc<ListenerShared>) -> Result<()> {
        self.submit(Command::Attach(listener)).await
    }

    pub async fn detach(&self, listener: Arc<ListenerShared>) -> Result<()> {
        self.submit(Command::Detach(listener)).await
    }

    pub async fn subscribe(&self, listener: Arc<ListenerShared>, id: EventId) -> Result<()> {
        self.check_id(id)?;
        self.submit(Command::SubscribeOne { listener, id }).await
    }

    pub async fn subscribe_list(&self, listener: Arc<ListenerShared>, ids: Vec<EventId>) -> Result<()> {
        for id in &ids {
            self.check_id(*id)?;
        }
        self.submit(Command::SubscribeList { listener, ids }).await
    }

    pub async fn unsubscribe(&self, listener: Arc<ListenerShared>, id: EventId) -> Result<()> {
        self.check_id(id)?;
        self.submit(Command::UnsubscribeOne { listener, id }).await
    }

    /// Publish from a task producer. Retained publishes require a static
    /// record; this is asserted in the worker, matching section 4.4's
    /// treatment of that case as a programmer error rather than a
    /// recoverable one.
    pub async fn publish(&self, event: EventRecord, retain: bool) -> Result<()> {
        self.check_id(event.id())?;
        self.submit(Command::Publish { event, retain }).await
    }

    /// Publish from an ISR-like producer: non-blocking, no wait on the
    /// worker's acknowledgement. Returns `false` if the pipeline is full,
    /// in which case the event is lost and the caller decides what to do.
    pub fn publish_from_isr(&self, event: EventRecord) -> bool {
        if self.check_id(event.id()).is_err() {
            return false;
        }
        self.command_tx.try_send((Command::Publish { event, retain: false }, None)).is_ok()
    }

    /// Deliver directly to one listener, bypassing fan-out and the
    /// subscription test, bumping refcounts as if fan-out had enqueued it.
    pub async fn publish_to_listener(
        &self,
        listener: &Arc<ListenerShared>,
        event: EventRecord,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_id(event.id())?;
        delivery::dispatch_to_listener(listener, event, timeout).await
    }

    pub async fn invalidate(&self, id: EventId) -> Result<()> {
        self.check_id(id)?;
        self.submit(Command::Invalidate(id)).await
    }

    /// Allocate a dynamic event record from the smallest pool whose block
    /// size covers `payload`.
    pub fn event_alloc(&self, id: EventId, publisher_id: u16, payload: Vec<u8>) -> Result<EventRecord> {
        self.check_id(id)?;
        let (pool_index, block_index, _block_size) = self.critical.allocate(payload.len())?;
        Ok(EventRecord::new_dynamic(
            self.critical.clone(),
            pool_index,
            block_index,
            id,
            publisher_id,
            payload,
        ))
    }

    /// Release a claim on `record` held on behalf of `listener`.
    pub fn event_release(&self, record: &EventRecord, listener: &Arc<ListenerShared>) -> Result<()> {
        record.release(listener)
    }
}
