//! `wait_event`: a convenience producer primitive built entirely out of
//! the public API — a temporary notification-mode listener, attached,
//! subscribed to one id, waited on with a timeout, then detached.

use std::time::Duration;

use crate::bus::Bus;
use crate::error::{BusError, Result};
use crate::event::EventId;
use crate::listener::ListenerShared;

impl Bus {
    /// Wait up to `timeout` for a delivery of `id`. Requires the bus to be
    /// configured with a notification slot (`BusConfig::notification_slot`).
    pub async fn wait_event(&self, id: EventId, timeout: Duration) -> Result<bool> {
        if !self.config().notification_slot {
            return Err(BusError::NotificationUnavailable);
        }

        let (listener, notify) = ListenerShared::notification(None);
        self.attach(listener.clone()).await?;
        self.subscribe(listener.clone(), id).await?;

        let passed = tokio::time::timeout(timeout, notify.notified()).await.is_ok();

        // A notification may have landed in the narrow window between the
        // timeout firing and this detach; one more non-blocking take
        // closes it, matching the original's post-timeout recheck.
        let passed = passed || tokio::time::timeout(Duration::ZERO, notify.notified()).await.is_ok();

        self.detach(listener).await?;
        Ok(passed)
    }
}
