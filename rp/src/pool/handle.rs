//! PoolExecutor - client interface to a pool actor

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use super::config::PoolConfig;
use super::core::PoolActor;
use super::error::PoolError;
use super::messages::PoolCommand;
use super::priority::Priority;
use super::request::{QueuedRequest, RequestHandle};
use super::stats::{PoolStatistics, PoolStatus};
use crate::events::{PoolEvent, PoolEventBus};

struct Shared {
    name: String,
    config: PoolConfig,
    tx: mpsc::UnboundedSender<PoolCommand>,
    snapshots: watch::Receiver<PoolStatistics>,
    events: PoolEventBus,
    next_seq: AtomicU64,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: nobody can submit or dispose any more
        let _ = self.tx.send(PoolCommand::Dispose);
    }
}

/// Handle to a running pool
///
/// Cloning is cheap; all clones drive the same pool. Dropping the last clone
/// disposes the pool. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct PoolExecutor {
    shared: Arc<Shared>,
}

impl PoolExecutor {
    /// Validate the configuration and spawn the pool's actor task
    pub fn spawn(name: impl Into<String>, config: PoolConfig) -> Result<Self> {
        let name = name.into();
        debug!(pool = %name, "PoolExecutor::spawn: called");
        config
            .validate()
            .wrap_err_with(|| format!("Invalid configuration for pool {}", name))?;

        let events = PoolEventBus::new(name.clone(), config.event_capacity);
        let actor = PoolActor::new(name.clone(), config.clone(), events.clone());
        let tx = actor.sender();
        let snapshots = actor.snapshots();
        tokio::spawn(actor.run());

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                config,
                tx,
                snapshots,
                events,
                next_seq: AtomicU64::new(1),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Submit work with the pool's default queue timeout
    ///
    /// The returned handle resolves with the operation's result, or with
    /// `Dropped`, `QueueTimeout` or `Disposed` if it never ran.
    pub fn submit<T, F, Fut>(&self, id: impl Into<String>, priority: Priority, operation: F) -> RequestHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let timeout = self.shared.config.default_timeout();
        self.submit_with_timeout(id, priority, timeout, operation)
    }

    /// Submit work that expires if it waits in the queue longer than `timeout`
    pub fn submit_with_timeout<T, F, Fut>(
        &self,
        id: impl Into<String>,
        priority: Priority,
        timeout: Duration,
        operation: F,
    ) -> RequestHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let (request, handle) = QueuedRequest::new(&self.shared.name, seq, id, priority, timeout, operation);
        debug!(pool = %self.shared.name, id = %request.id(), %priority, ?timeout, "PoolExecutor::submit: called");

        if let Err(mpsc::error::SendError(PoolCommand::Submit { request })) =
            self.shared.tx.send(PoolCommand::Submit { request })
        {
            debug!(pool = %self.shared.name, "PoolExecutor::submit: pool task gone");
            request.reject(PoolError::Disposed {
                pool: self.shared.name.clone(),
            });
        }
        handle
    }

    /// Stop starting new work; queued work keeps expiring
    pub fn pause(&self) {
        debug!(pool = %self.shared.name, "PoolExecutor::pause: called");
        self.send(PoolCommand::Pause);
    }

    /// Start work again, dispatching immediately
    pub fn resume(&self) {
        debug!(pool = %self.shared.name, "PoolExecutor::resume: called");
        self.send(PoolCommand::Resume);
    }

    /// Drop every queued request; running operations are unaffected
    pub fn clear_queue(&self) {
        debug!(pool = %self.shared.name, "PoolExecutor::clear_queue: called");
        self.send(PoolCommand::ClearQueue);
    }

    /// Stop the pool for good; safe to call more than once
    pub fn dispose(&self) {
        debug!(pool = %self.shared.name, "PoolExecutor::dispose: called");
        self.send(PoolCommand::Dispose);
    }

    /// Exact statistics, ordered after every command this handle sent before
    ///
    /// Falls back to the last published snapshot once the pool has stopped.
    pub async fn statistics(&self) -> PoolStatistics {
        debug!(pool = %self.shared.name, "PoolExecutor::statistics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.shared.tx.send(PoolCommand::GetStatistics { reply_tx }).is_err() {
            return self.snapshot();
        }
        reply_rx.await.unwrap_or_else(|_| self.snapshot())
    }

    /// Most recently published statistics, without waiting on the pool
    pub fn snapshot(&self) -> PoolStatistics {
        self.shared.snapshots.borrow().clone()
    }

    /// Most recently published health classification
    ///
    /// May lag commands still in flight to the pool; use [`Self::statistics`]
    /// for a value ordered after them.
    pub fn status(&self) -> PoolStatus {
        self.shared.snapshots.borrow().status
    }

    /// Whether a slot was free at the last published snapshot (advisory, not a reservation)
    ///
    /// A just-submitted request may be about to take that slot. Await
    /// [`Self::statistics`] and check `has_free_slot()` for an exact answer.
    pub fn can_submit_immediately(&self) -> bool {
        self.shared.snapshots.borrow().has_free_slot()
    }

    /// Whether the pool has been disposed
    pub fn is_disposed(&self) -> bool {
        self.shared.tx.is_closed() || self.shared.snapshots.borrow().disposed
    }

    /// Receive status-change, drop and expiry notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    fn send(&self, command: PoolCommand) {
        if self.shared.tx.send(command).is_err() {
            debug!(pool = %self.shared.name, "PoolExecutor: pool task gone, command ignored");
        }
    }
}

impl std::fmt::Debug for PoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolExecutor")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
