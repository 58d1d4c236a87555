use std::sync::Arc;

use tokio::sync::oneshot;

use crate::event::{EventId, EventRecord};
use crate::listener::ListenerShared;

/// One command kind carried through the pipeline, mutating the listener
/// set or the retained table.
#[derive(Debug)]
pub enum Command {
    Attach(Arc<ListenerShared>),
    Detach(Arc<ListenerShared>),
    SubscribeOne { listener: Arc<ListenerShared>, id: EventId },
    SubscribeList { listener: Arc<ListenerShared>, ids: Vec<EventId> },
    UnsubscribeOne { listener: Arc<ListenerShared>, id: EventId },
    Publish { event: EventRecord, retain: bool },
    Invalidate(EventId),
}

/// Acknowledgement channel for a command. `None` for ISR-originated
/// publishes, which never wait on the worker.
pub type CommandAck = Option<oneshot::Sender<()>>;
