//! Read-only reporters that walk the listener set and pool statistics to
//! emit textual summaries. A listener snapshot is requested over its own
//! channel rather than mixed into `Command`, the way a queue manager can
//! give job submission, job requests, and commands each their own `mpsc`
//! channel into one worker loop.

use std::fmt::Write as _;

use tokio::sync::oneshot;

use crate::bus::Bus;
use crate::error::{BusError, Result};
use crate::event::EventId;
use crate::listener::ListenerId;

#[derive(Debug, Clone)]
pub(crate) struct ListenerInfo {
    pub(crate) id: ListenerId,
    pub(crate) name: Option<String>,
    pub(crate) mode: &'static str,
    pub(crate) overflow: bool,
    pub(crate) ref_count: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ListenerSnapshot {
    pub(crate) listeners: Vec<ListenerInfo>,
}

/// Truncate `text` to at most `bound` bytes, on a char boundary, the way
/// the reference library's `snprintf`-based formatters stop at a caller
/// supplied buffer size.
fn truncate(mut text: String, bound: usize) -> String {
    if text.len() > bound {
        let mut cut = bound;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

impl Bus {
    pub(crate) async fn listener_snapshot(&self) -> Result<ListenerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.snapshot_tx
            .send(tx)
            .await
            .map_err(|_| BusError::PipelineClosed)?;
        rx.await.map_err(|_| BusError::PipelineClosed)
    }

    /// Write a human-readable summary of every attached listener,
    /// truncating at `bound` bytes.
    pub async fn format_listeners(&self, bound: usize) -> Result<String> {
        let snapshot = self.listener_snapshot().await?;
        let mut out = String::new();
        for listener in &snapshot.listeners {
            let _ = writeln!(
                out,
                "listener {:?} name={} mode={} overflow={} ref_count={}",
                listener.id,
                listener.name.as_deref().unwrap_or("-"),
                listener.mode,
                listener.overflow,
                listener.ref_count,
            );
        }
        Ok(truncate(out, bound))
    }

    /// Write a human-readable summary of per-event-id response-time
    /// statistics, truncating at `bound` bytes.
    pub fn format_response_stats(&self, bound: usize) -> String {
        let mut out = String::new();
        for (id, stats) in self.critical.all_response_stats().into_iter().enumerate() {
            if stats.min.is_none() && stats.max.is_none() {
                continue;
            }
            let _ = writeln!(
                out,
                "event {} min={:?} max={:?}",
                EventId(id as u32).0,
                stats.min,
                stats.max,
            );
        }
        truncate(out, bound)
    }

    /// Write a human-readable summary of pool allocator statistics,
    /// truncating at `bound` bytes.
    pub fn format_pools(&self, bound: usize) -> String {
        let mut out = String::new();
        for (index, info) in self.critical.pool_info().into_iter().enumerate() {
            let _ = writeln!(
                out,
                "pool[{index}] block_size={} blocks={} live={} free={} high_water={}",
                info.block_size, info.block_count, info.count, info.free_count, info.high_water,
            );
        }
        truncate(out, bound)
    }
}
