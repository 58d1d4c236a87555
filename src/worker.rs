//! The single task that drains the command pipeline and applies each
//! command against the listener set and retained table. Runs with no
//! `.await` inside command application, so a command always runs to
//! completion without interleaving another command's effects.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::bitmap::Bitmap;
use crate::command::{Command, CommandAck};
use crate::config::BusConfig;
use crate::delivery;
use crate::diagnostics::{ListenerInfo, ListenerSnapshot};
use crate::event::EventRecord;
use crate::listener::{DeliveryMode, ListenerId, ListenerShared};

/// A listener as seen by the worker: its public handle plus the
/// subscription bitmap, which only the worker ever touches.
pub(crate) struct ActiveListener {
    pub(crate) handle: Arc<ListenerShared>,
    pub(crate) subscription: Bitmap,
}

pub(crate) struct Worker {
    mask_width: u32,
    active: Vec<ActiveListener>,
    retained: Vec<Option<EventRecord>>,
}

impl Worker {
    pub(crate) fn new(config: &BusConfig) -> Self {
        Self {
            mask_width: config.mask_width,
            active: Vec::new(),
            retained: vec![None; config.event_count() as usize],
        }
    }

    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<(Command, CommandAck)>,
        mut snapshot_rx: mpsc::Receiver<oneshot::Sender<ListenerSnapshot>>,
    ) {
        info!("event bus worker started");
        loop {
            tokio::select! {
                command = rx.recv() => {
                    let Some((command, ack)) = command else { break };
                    self.apply(command);
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                reply = snapshot_rx.recv() => {
                    let Some(reply) = reply else { break };
                    let _ = reply.send(self.snapshot());
                }
                else => break,
            }
        }
        info!("event bus worker stopped");
    }

    fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            listeners: self
                .active
                .iter()
                .map(|entry| ListenerInfo {
                    id: entry.handle.id(),
                    name: entry.handle.name().map(str::to_owned),
                    mode: match entry.handle.mode() {
                        DeliveryMode::Callback(_) => "callback",
                        DeliveryMode::Queue(_) => "queue",
                        DeliveryMode::Notification(_) => "notification",
                    },
                    overflow: entry.handle.overflow(),
                    ref_count: entry.handle.ref_count(),
                })
                .collect(),
        }
    }

    fn find_index(&self, id: ListenerId) -> Option<usize> {
        self.active.iter().position(|entry| entry.handle.id() == id)
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Attach(listener) => {
                debug!(listener = ?listener.id(), "attach");
                self.active.push(ActiveListener {
                    handle: listener,
                    subscription: Bitmap::new(self.mask_width),
                });
            }
            Command::Detach(listener) => {
                debug!(listener = ?listener.id(), "detach");
                let index = self
                    .find_index(listener.id())
                    .expect("detach: listener is not attached");
                self.active.remove(index);
            }
            Command::SubscribeOne { listener, id } => self.subscribe_one(&listener, id),
            Command::SubscribeList { listener, ids } => {
                for id in ids {
                    self.subscribe_one(&listener, id);
                }
            }
            Command::UnsubscribeOne { listener, id } => {
                let index = self
                    .find_index(listener.id())
                    .expect("unsubscribe: listener is not attached");
                self.active[index].subscription.clear(id);
            }
            Command::Publish { event, retain } => self.publish(event, retain),
            Command::Invalidate(id) => {
                self.retained[id.0 as usize] = None;
            }
        }
    }

    fn subscribe_one(&mut self, listener: &Arc<ListenerShared>, id: crate::event::EventId) {
        let index = self
            .find_index(listener.id())
            .expect("subscribe: listener is not attached");
        self.active[index].subscription.set(id);
        if let Some(retained) = self.retained[id.0 as usize].clone() {
            delivery::dispatch(&self.active[index].handle, &retained);
        }
    }

    fn publish(&mut self, event: EventRecord, retain: bool) {
        assert!(
            !(retain && event.is_dynamic()),
            "publish: a retained event must be static"
        );
        event.mark_published();
        self.retained[event.id().0 as usize] = if retain { Some(event.clone()) } else { None };

        delivery::fan_out(&self.active, &event);

        if event.is_dynamic() {
            event.free_if_unclaimed();
        }
    }
}
