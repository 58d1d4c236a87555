//! Delivery engine: invoked by the worker during a publish. Walks the
//! active listener list, tests the subscription bitmap, and dispatches by
//! mode. The dispatch chain is callback, else queue, else notification —
//! preserved here as `match` arm order even though `DeliveryMode` makes
//! more than one mode per listener unrepresentable.

use std::time::Duration;

use tracing::warn;

use crate::error::{BusError, Result};
use crate::event::EventRecord;
use crate::listener::{DeliveryMode, ListenerShared};
use crate::worker::ActiveListener;

/// Fan out `event` to every active listener whose subscription covers its
/// id. After fan-out, if the event is dynamic and unclaimed, it is freed
/// immediately by the caller (the worker), not here.
pub(crate) fn fan_out(active: &[ActiveListener], event: &EventRecord) {
    for entry in active {
        if entry.subscription.test(event.id()) {
            dispatch(&entry.handle, event);
        }
    }
}

/// Deliver `event` to exactly one listener, bypassing the subscription
/// test, using the non-blocking send-from-ISR primitive. Used for fan-out
/// and for retained redelivery on subscribe; callable from either the
/// worker or an ISR producer, per the "ISR publishing" redesign note.
pub(crate) fn dispatch(handle: &ListenerShared, event: &EventRecord) {
    match handle.mode() {
        DeliveryMode::Callback(callback) => {
            callback(event);
        }
        DeliveryMode::Queue(sender) => {
            // Claim before the send, not after: the instant `try_send`
            // returns `Ok`, the record is visible to a consumer on another
            // task, which can run `event_release` before this function gets
            // back from the channel call. Claiming first means the count
            // is never zero while the record is enqueue-visible; undo it if
            // the send never actually happened.
            event.claim();
            handle.claim();
            if sender.try_send(event.clone()).is_err() {
                event.unclaim();
                handle.release_claim();
                handle.set_overflow();
                warn!(
                    listener = ?handle.id(),
                    event = event.id().0,
                    "listener queue full, delivery dropped"
                );
            }
        }
        DeliveryMode::Notification(notify) => {
            notify.notify_one();
        }
    }
}

/// Targeted delivery used by `Bus::publish_to_listener`: bypasses fan-out
/// and the subscription test entirely, bumping refcounts as if fan-out had
/// enqueued. Queue-mode sends honor the caller-supplied timeout the way a
/// task producer's pipeline send does; callback and notification modes
/// have no notion of blocking and ignore it.
pub(crate) async fn dispatch_to_listener(
    handle: &ListenerShared,
    event: EventRecord,
    timeout: Option<Duration>,
) -> Result<()> {
    match handle.mode() {
        DeliveryMode::Callback(callback) => {
            callback(&event);
            Ok(())
        }
        DeliveryMode::Queue(sender) => {
            // Same ordering requirement as `dispatch`: claim before the
            // `.await` on `send` resolves, since a consumer could drain and
            // release the record the instant it lands in the channel, well
            // before control returns here to run `claim()`.
            event.claim();
            handle.claim();
            let send = sender.send(event.clone());
            let result = match timeout {
                Some(duration) => match tokio::time::timeout(duration, send).await {
                    Ok(sent) => sent.map_err(|_| BusError::PipelineClosed),
                    Err(_) => Err(BusError::Timeout),
                },
                None => send.await.map_err(|_| BusError::PipelineClosed),
            };
            if result.is_err() {
                event.unclaim();
                handle.release_claim();
            }
            result
        }
        DeliveryMode::Notification(notify) => {
            notify.notify_one();
            Ok(())
        }
    }
}
