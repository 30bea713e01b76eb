//! Commands processed by a pool's actor task

use std::time::Duration;

use tokio::sync::oneshot;

use super::request::{QueuedRequest, Settled};
use super::stats::PoolStatistics;

/// Requests to the pool actor
///
/// Handles and running operations only ever talk to the actor through these;
/// all pool state is owned by the actor task.
#[derive(Debug)]
pub(crate) enum PoolCommand {
    /// Admit (or shed) a new request
    Submit { request: QueuedRequest },

    /// A dispatched operation ran to completion
    Finished {
        seq: u64,
        elapsed: Duration,
        settled: Settled,
    },

    /// Stop starting new work
    Pause,

    /// Start work again and dispatch at once
    Resume,

    /// Drop every queued request
    ClearQueue,

    /// Stop the timer, clear the queue, refuse further submissions
    Dispose,

    /// Take an exact statistics snapshot
    GetStatistics {
        reply_tx: oneshot::Sender<PoolStatistics>,
    },
}
