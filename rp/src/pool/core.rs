//! Pool actor task
//!
//! One task per pool owns the queue, the active set and the counters. It
//! multiplexes handle commands, completion reports from running operations,
//! and the dispatch/expiry timer. Because every mutation happens on this one
//! task, a record leaves the queue before anything resolves it, and no locks
//! guard the pool state.

use std::collections::HashMap;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::PoolConfig;
use super::error::{DropReason, PoolError};
use super::messages::PoolCommand;
use super::priority::Priority;
use super::queue::PriorityQueue;
use super::request::QueuedRequest;
use super::stats::{PoolCounters, PoolStatistics, PoolStatus, classify};
use crate::events::PoolEventBus;

/// A dispatched request, tracked until its operation reports back
struct ActiveRequest {
    id: String,
    priority: Priority,
}

/// The task that owns one pool's state
pub(crate) struct PoolActor {
    name: String,
    config: PoolConfig,
    tx: mpsc::UnboundedSender<PoolCommand>,
    rx: mpsc::UnboundedReceiver<PoolCommand>,
    queue: PriorityQueue,
    active: HashMap<u64, ActiveRequest>,
    counters: PoolCounters,
    paused: bool,
    disposed: bool,
    status: PoolStatus,
    events: PoolEventBus,
    snapshot_tx: watch::Sender<PoolStatistics>,
}

impl PoolActor {
    pub(crate) fn new(name: impl Into<String>, config: PoolConfig, events: PoolEventBus) -> Self {
        let name = name.into();
        debug!(pool = %name, ?config, "PoolActor::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(PoolStatistics::default());
        let actor = Self {
            name,
            config,
            tx,
            rx,
            queue: PriorityQueue::new(),
            active: HashMap::new(),
            counters: PoolCounters::default(),
            paused: false,
            disposed: false,
            status: PoolStatus::Healthy,
            events,
            snapshot_tx,
        };
        actor.publish();
        actor
    }

    /// Sender for building handles
    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<PoolCommand> {
        self.tx.clone()
    }

    /// Receiver of the snapshot published after every state change
    pub(crate) fn snapshots(&self) -> watch::Receiver<PoolStatistics> {
        self.snapshot_tx.subscribe()
    }

    /// Run until disposed and every in-flight operation has reported back
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.process_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pool = %self.name,
            max_concurrent = self.config.max_concurrent,
            max_queue_size = self.config.max_queue_size,
            "Pool started"
        );

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = ticker.tick(), if !self.disposed => self.on_tick(),
            }

            self.refresh_status();
            self.publish();

            if self.disposed && self.active.is_empty() {
                break;
            }
        }

        info!(pool = %self.name, "Pool stopped");
    }

    fn handle(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::Submit { request } => self.admit(request),

            PoolCommand::Finished { seq, elapsed, settled } => {
                let succeeded = settled.succeeded();
                if let Some(finished) = self.active.remove(&seq) {
                    debug!(
                        pool = %self.name,
                        id = %finished.id,
                        priority = %finished.priority,
                        ?elapsed,
                        succeeded,
                        "Request finished"
                    );
                }
                if succeeded {
                    self.counters.record_success(elapsed);
                } else {
                    self.counters.record_failure();
                }
                settled.deliver();
                self.dispatch();
            }

            PoolCommand::Pause => {
                if !self.paused {
                    info!(pool = %self.name, "Pool paused");
                    self.paused = true;
                }
            }

            PoolCommand::Resume => {
                if self.paused {
                    info!(pool = %self.name, "Pool resumed");
                    self.paused = false;
                }
                self.dispatch();
            }

            PoolCommand::ClearQueue => self.clear(),

            PoolCommand::Dispose => {
                if self.disposed {
                    debug!(pool = %self.name, "Pool already disposed");
                    return;
                }
                info!(pool = %self.name, in_flight = self.active.len(), "Disposing pool");
                self.disposed = true;
                self.clear();
            }

            PoolCommand::GetStatistics { reply_tx } => {
                let _ = reply_tx.send(self.statistics());
            }
        }
    }

    /// Admission policy, then enqueue and try to dispatch
    fn admit(&mut self, request: QueuedRequest) {
        if self.disposed {
            debug!(pool = %self.name, id = %request.id(), "Submission after dispose, rejecting");
            let pool = self.name.clone();
            request.reject(PoolError::Disposed { pool });
            return;
        }

        if self.config.drop_low_priority_on_overload
            && request.priority().is_droppable()
            && self.current_status() == PoolStatus::Overloaded
        {
            warn!(
                pool = %self.name,
                id = %request.id(),
                queued = self.queue.len(),
                "Pool overloaded, dropping low priority request"
            );
            self.counters.record_drop();
            self.events.dropped(request.id(), request.priority(), DropReason::Overloaded);
            let id = request.id().to_string();
            request.reject(PoolError::Dropped {
                id,
                reason: DropReason::Overloaded,
            });
            return;
        }

        debug!(
            pool = %self.name,
            id = %request.id(),
            priority = %request.priority(),
            timeout = ?request.timeout(),
            "Request queued"
        );
        self.queue.push(request);
        self.counters.observe_depths(self.queue.len(), self.active.len());
        self.dispatch();
    }

    /// Start queued work while concurrency budget remains
    fn dispatch(&mut self) {
        if self.paused || self.disposed {
            return;
        }

        let now = Instant::now();
        while self.active.len() < self.config.max_concurrent {
            let Some(request) = self.queue.pop() else {
                break;
            };
            if request.is_expired(now) {
                // Expired heads never take a slot
                self.expire(request, now);
                continue;
            }
            self.start(request, now);
        }
    }

    fn start(&mut self, request: QueuedRequest, now: Instant) {
        let seq = request.seq();
        debug!(
            pool = %self.name,
            id = %request.id(),
            priority = %request.priority(),
            waited = ?request.wait_time(now),
            "Dispatching request"
        );

        self.active.insert(
            seq,
            ActiveRequest {
                id: request.id().to_string(),
                priority: request.priority(),
            },
        );
        self.counters.observe_depths(self.queue.len(), self.active.len());

        let tx = self.tx.clone();
        let operation = request.start();
        tokio::spawn(async move {
            let started = Instant::now();
            let settled = operation.await;
            let elapsed = started.elapsed();

            // Report before delivering so statistics never lag the caller
            if let Err(mpsc::error::SendError(PoolCommand::Finished { settled, .. })) =
                tx.send(PoolCommand::Finished { seq, elapsed, settled })
            {
                settled.deliver();
            }
        });
    }

    fn on_tick(&mut self) {
        let now = Instant::now();
        let expired = self.queue.drain_expired(now);
        if !expired.is_empty() {
            debug!(pool = %self.name, count = expired.len(), "Expiry sweep removed requests");
        }
        for request in expired {
            self.expire(request, now);
        }
        self.dispatch();
    }

    fn expire(&mut self, request: QueuedRequest, now: Instant) {
        let waited = request.wait_time(now);
        warn!(
            pool = %self.name,
            id = %request.id(),
            priority = %request.priority(),
            ?waited,
            timeout = ?request.timeout(),
            "Request timed out in queue"
        );
        self.counters.record_failure();
        self.events.expired(request.id(), request.priority(), waited);
        request.expire(now);
    }

    /// Drop every queued request; running operations are left alone
    fn clear(&mut self) {
        let cleared = self.queue.drain_all();
        if cleared.is_empty() {
            return;
        }

        info!(pool = %self.name, count = cleared.len(), "Clearing queue");
        for request in cleared {
            self.counters.record_drop();
            self.events.dropped(request.id(), request.priority(), DropReason::Cleared);
            let id = request.id().to_string();
            request.reject(PoolError::Dropped {
                id,
                reason: DropReason::Cleared,
            });
        }
    }

    fn current_status(&self) -> PoolStatus {
        classify(
            self.paused,
            self.queue.len(),
            self.config.max_queue_size,
            self.config.backpressure_ratio,
        )
    }

    /// Emit a notification when classified health changes
    fn refresh_status(&mut self) {
        let status = self.current_status();
        if status == self.status {
            return;
        }

        match status {
            PoolStatus::Backpressure | PoolStatus::Overloaded => {
                warn!(
                    pool = %self.name,
                    from = %self.status,
                    to = %status,
                    queued = self.queue.len(),
                    "Pool status changed"
                );
            }
            PoolStatus::Healthy | PoolStatus::Paused => {
                info!(pool = %self.name, from = %self.status, to = %status, "Pool status changed");
            }
        }
        self.events.status_changed(self.status, status);
        self.status = status;
    }

    fn statistics(&self) -> PoolStatistics {
        let counters = &self.counters;
        PoolStatistics {
            pool: self.name.clone(),
            status: self.current_status(),
            active_requests: self.active.len(),
            queued_requests: self.queue.len(),
            completed_requests: counters.completed,
            failed_requests: counters.failed,
            dropped_requests: counters.dropped,
            total_processed: counters.completed + counters.failed,
            average_latency_ms: counters.average_latency().as_secs_f64() * 1000.0,
            max_concurrent: self.config.max_concurrent,
            max_queue_size: self.config.max_queue_size,
            peak_queue_depth: counters.peak_queue_depth,
            peak_concurrent: counters.peak_concurrent,
            disposed: self.disposed,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.statistics());
    }
}
