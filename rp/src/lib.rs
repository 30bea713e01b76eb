//! reqpool - bounded-concurrency request pools
//!
//! A request pool runs at most `max_concurrent` asynchronous operations at a
//! time and queues the rest by priority. Independent subsystems share
//! differently tuned pools through a caller-owned [`PoolRegistry`].
//!
//! # Core Concepts
//!
//! - **Four Tiers**: critical before high before normal before low, FIFO within a tier
//! - **Queue Timeouts**: work that waits too long fails instead of running late
//! - **Selective Shedding**: overloaded pools may refuse `low` work at admission
//! - **One Task Per Pool**: an actor owns all pool state; handles only send messages
//!
//! # Modules
//!
//! - [`pool`] - pool executor, priority queue, health and statistics
//! - [`events`] - observer notifications
//! - [`registry`] - named pool collection
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface
//! - [`simulate`] - synthetic traffic generator

pub mod cli;
pub mod config;
pub mod events;
pub mod pool;
pub mod registry;
pub mod simulate;

// Re-export commonly used types
pub use config::Config;
pub use events::{PoolEvent, PoolEventBus};
pub use pool::{
    DropReason, PoolConfig, PoolError, PoolExecutor, PoolResult, PoolStatistics, PoolStatus, Priority, PriorityQueue,
    QueuedRequest, RequestHandle, classify,
};
pub use registry::{API_POOL, PoolRegistry, UPLOAD_POOL};
pub use simulate::{SimulationObserver, SimulationOptions, SimulationReport, TrafficKind};
