//! Queued request records and their completion handles

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use eyre::eyre;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::{PoolError, PoolResult};
use super::priority::Priority;

/// Outcome of a finished operation, held until the pool has done its bookkeeping
pub(crate) struct Settled {
    succeeded: bool,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Settled {
    pub(crate) fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Hand the result to the waiting caller
    pub(crate) fn deliver(self) {
        (self.deliver)()
    }
}

impl std::fmt::Debug for Settled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settled")
            .field("succeeded", &self.succeeded)
            .finish_non_exhaustive()
    }
}

/// Type-erased operation plus its single-assignment result slot
trait PendingOperation: Send {
    fn run(self: Box<Self>) -> BoxFuture<'static, Settled>;

    fn reject(self: Box<Self>, error: PoolError);
}

struct TypedOperation<T, F> {
    operation: F,
    reply: oneshot::Sender<PoolResult<T>>,
}

impl<T, F, Fut> PendingOperation for TypedOperation<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = eyre::Result<T>> + Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture<'static, Settled> {
        let TypedOperation { operation, reply } = *self;
        Box::pin(async move {
            let result = match AssertUnwindSafe(async move { operation().await }).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(eyre!("operation panicked")),
            };
            let succeeded = result.is_ok();
            Settled {
                succeeded,
                deliver: Box::new(move || {
                    // The caller may have stopped waiting; that is not the pool's concern
                    let _ = reply.send(result.map_err(PoolError::Operation));
                }),
            }
        })
    }

    fn reject(self: Box<Self>, error: PoolError) {
        let _ = self.reply.send(Err(error));
    }
}

/// A unit of work waiting in a pool's queue
pub struct QueuedRequest {
    seq: u64,
    id: String,
    priority: Priority,
    timeout: Duration,
    enqueued_at: Instant,
    pending: Box<dyn PendingOperation>,
}

impl QueuedRequest {
    /// Create a record and the handle its submitter waits on
    pub fn new<T, F, Fut>(
        pool: &str,
        seq: u64,
        id: impl Into<String>,
        priority: Priority,
        timeout: Duration,
        operation: F,
    ) -> (Self, RequestHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let id = id.into();
        let (reply, rx) = oneshot::channel();
        let request = Self {
            seq,
            id: id.clone(),
            priority,
            timeout,
            enqueued_at: Instant::now(),
            pending: Box::new(TypedOperation { operation, reply }),
        };
        let handle = RequestHandle {
            id,
            pool: pool.to_string(),
            rx,
        };
        (request, handle)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// How long this record has been waiting as of `now`
    pub fn wait_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    /// Expired once the wait strictly exceeds the timeout
    pub fn is_expired(&self, now: Instant) -> bool {
        self.wait_time(now) > self.timeout
    }

    /// Resolve the caller's handle with a failure without running the operation
    pub(crate) fn reject(self, error: PoolError) {
        self.pending.reject(error);
    }

    /// Resolve the caller's handle with a queue timeout
    pub(crate) fn expire(self, now: Instant) {
        let error = PoolError::QueueTimeout {
            id: self.id.clone(),
            waited: self.wait_time(now),
            timeout: self.timeout,
        };
        self.reject(error);
    }

    /// Consume the record, yielding the future that runs its operation
    pub(crate) fn start(self) -> BoxFuture<'static, Settled> {
        self.pending.run()
    }
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("seq", &self.seq)
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Completion handle returned by `PoolExecutor::submit`
///
/// Resolves exactly once: with the operation's value, its error, or a pool
/// failure (dropped, timed out in queue, pool disposed).
#[must_use = "a request handle does nothing unless awaited"]
pub struct RequestHandle<T> {
    id: String,
    pool: String,
    rx: oneshot::Receiver<PoolResult<T>>,
}

impl<T> RequestHandle<T> {
    /// The caller-supplied request id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the pool the request was submitted to
    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl<T> Future for RequestHandle<T> {
    type Output = PoolResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        // A slot closed without a value means the pool went away with the record
        Pin::new(&mut this.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(PoolError::Disposed {
                    pool: this.pool.clone(),
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::error::DropReason;

    fn record(timeout: Duration) -> (QueuedRequest, RequestHandle<u32>) {
        QueuedRequest::new("test", 1, "req-1", Priority::Normal, timeout, || async { Ok::<_, eyre::Report>(7u32) })
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strictly_after_timeout() {
        let (request, _handle) = record(Duration::from_millis(10));
        let enqueued = request.enqueued_at();

        assert!(!request.is_expired(enqueued + Duration::from_millis(10)));
        assert!(request.is_expired(enqueued + Duration::from_millis(11)));
        assert_eq!(
            request.wait_time(enqueued + Duration::from_millis(4)),
            Duration::from_millis(4)
        );
    }

    #[tokio::test]
    async fn test_run_then_deliver_resolves_handle() {
        let (request, handle) = record(Duration::from_secs(1));
        assert_eq!(handle.id(), "req-1");

        let settled = request.start().await;
        assert!(settled.succeeded());
        settled.deliver();

        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_operation_error_surfaces_unchanged() {
        let (request, handle) =
            QueuedRequest::new("test", 2, "req-2", Priority::High, Duration::from_secs(1), || async {
                Err::<(), _>(eyre!("server said no"))
            });

        let settled = request.start().await;
        assert!(!settled.succeeded());
        settled.deliver();

        let err = handle.await.unwrap_err();
        assert!(err.is_operation());
        assert_eq!(err.to_string(), "server said no");
    }

    #[tokio::test]
    async fn test_panicking_operation_counts_as_failure() {
        let (request, handle) =
            QueuedRequest::new("test", 3, "req-3", Priority::Low, Duration::from_secs(1), || async {
                if true {
                    panic!("boom");
                }
                Ok::<(), eyre::Report>(())
            });

        let settled = request.start().await;
        assert!(!settled.succeeded());
        settled.deliver();
        assert!(handle.await.unwrap_err().is_operation());
    }

    #[tokio::test]
    async fn test_reject_resolves_with_error() {
        let (request, handle) = record(Duration::from_secs(1));
        request.reject(PoolError::Dropped {
            id: "req-1".to_string(),
            reason: DropReason::Cleared,
        });
        assert!(handle.await.unwrap_err().is_dropped());
    }

    #[tokio::test]
    async fn test_dropped_record_resolves_disposed() {
        let (request, handle) = record(Duration::from_secs(1));
        drop(request);
        assert!(matches!(handle.await, Err(PoolError::Disposed { .. })));
    }
}
