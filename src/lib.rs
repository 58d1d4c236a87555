//! An in-process publish/subscribe event bus for real-time environments
//! where multiple concurrent tasks communicate without direct coupling.
//!
//! Publishers emit events identified by a small integer ([`EventId`]);
//! listeners subscribe to subsets of those ids and receive deliveries
//! through one of three mechanisms — a synchronous callback, a bounded
//! queue, or a one-shot notification — tried in that order. All mutation
//! of the subscription graph and the retained-event table goes through a
//! single serializing [`Bus`] worker, so state-changing operations have a
//! total order even though publication is also available from a
//! non-blocking, "interrupt-safe" path.
//!
//! ```no_run
//! use eventbus::{Bus, BusConfig, EventId, ListenerShared};
//!
//! # async fn run() -> eventbus::Result<()> {
//! let bus = Bus::init(BusConfig::default());
//!
//! let listener = ListenerShared::callback(
//!     |event| println!("got event {:?}: {:?}", event.id(), event.payload()),
//!     Some("demo".to_string()),
//! );
//! bus.attach(listener.clone()).await?;
//! bus.subscribe(listener, EventId(1)).await?;
//!
//! let record = eventbus::EventRecord::new_static(EventId(1), 0, b"hello".to_vec());
//! bus.publish(record, false).await?;
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod bus;
pub mod command;
pub mod config;
pub mod critical;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod listener;
pub mod pool;
pub mod wait;
pub mod worker;

pub use bus::Bus;
pub use config::{BusConfig, PoolClass};
pub use error::{BusError, Result};
pub use event::{AllocationClass, EventId, EventRecord};
pub use listener::{DeliveryMode, ListenerId, ListenerShared};
pub use pool::PoolInfo;
