//! A broadcast worker pool with a quorum barrier.
//!
//! A [`Coordinator`] owns a fixed set of worker threads and a single shared
//! [`BroadcastQueue`]. Every job pushed to the queue is dispatched exactly
//! once by every live worker, in push order, and leaves the queue only after
//! all of them have read it. Workers answer through a [`ResponseCollector`];
//! the coordinator picks the first answer that passes a [`Verify`] check and
//! hands it to a [`Store`].
//!
//! ```
//! use quorum::{Coordinator, PoolConfig, Tagged};
//!
//! #[derive(Debug)]
//! struct Square(u64);
//!
//! impl Tagged for Square {
//!     type Tag = ();
//!
//!     fn tag(&self) {}
//! }
//!
//! let pool = Coordinator::<Square, u64>::builder(PoolConfig::new(3))
//!     .handler((), |_, msg| msg.job().map(|Square(n)| n * n))
//!     .build()?;
//!
//! let report = pool.mine(Square(7), &|r: &u64| *r == 49)?;
//! assert_eq!(report.harvested, 3);
//! assert_eq!(report.record.verified_by, 2);
//!
//! pool.shutdown()?;
//! # Ok::<(), quorum::Error>(())
//! ```

mod collector;
mod config;
mod coordinator;
mod error;
mod id;
mod message;
mod queue;
mod registry;
mod status;
mod store;
mod verify;
mod worker;

pub use crate::collector::*;
pub use crate::config::*;
pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::message::*;
pub use crate::queue::*;
pub use crate::registry::*;
pub use crate::status::*;
pub use crate::store::*;
pub use crate::verify::*;
pub use crate::worker::*;
