//! Bounded-concurrency request pool
//!
//! A pool accepts asynchronous units of work tagged with a [`Priority`], runs
//! at most `max_concurrent` of them at once and queues the rest in four FIFO
//! tiers. Queued work that waits past its timeout is expired; `low` work is
//! shed at admission while an overloaded pool has the drop policy enabled.

mod config;
mod core;
mod error;
mod handle;
mod messages;
mod priority;
mod queue;
mod request;
mod stats;

pub use config::{DEFAULT_BACKPRESSURE_RATIO, PoolConfig};
pub use error::{DropReason, PoolError, PoolResult};
pub use handle::PoolExecutor;
pub use priority::Priority;
pub use queue::PriorityQueue;
pub use request::{QueuedRequest, RequestHandle};
pub use stats::{PoolStatistics, PoolStatus, classify};
