use thiserror::Error;

use crate::event::EventId;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("event id {0:?} is out of range for this bus")]
    InvalidEventId(EventId),

    #[error("pool exhausted: no block available for a payload of {0} bytes")]
    PoolExhausted(usize),

    #[error("requested payload of {requested} bytes exceeds the largest pool class ({largest})")]
    PayloadTooLarge { requested: usize, largest: usize },

    #[error("command pipeline is full")]
    PipelineFull,

    #[error("command pipeline is closed")]
    PipelineClosed,

    #[error("wait_event timed out")]
    Timeout,

    #[error("bus is not configured with a notification slot")]
    NotificationUnavailable,
}

pub type Result<T> = std::result::Result<T, BusError>;
