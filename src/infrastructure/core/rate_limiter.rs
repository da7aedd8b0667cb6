use crate::domain::errors::FetchError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

struct Job {
    generation: u64,
    run: Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>,
}

/// Per-provider call scheduler: at most `max_calls` task executions inside
/// any rolling `window`, strict FIFO dispatch, one task in flight at a time.
///
/// Construct one instance per provider and inject it into that provider's
/// fetcher; independent limiters never interact. State lives in a spawned
/// dispatch loop; the handle is cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    generation: Arc<AtomicU64>,
    reset_notify: Arc<Notify>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, max_calls: usize, window: Duration) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let reset_notify = Arc::new(Notify::new());

        tokio::spawn(dispatch_loop(
            name.clone(),
            rx,
            max_calls.max(1),
            window,
            generation.clone(),
            reset_notify.clone(),
        ));

        RateLimiter {
            name,
            tx,
            generation,
            reset_notify,
        }
    }

    /// Queue a task for rate-limited execution. The returned future settles
    /// with the task's own result; a failing task settles only itself and
    /// never disturbs sibling queued tasks.
    pub async fn enqueue<T, F, Fut>(&self, task: F) -> Result<T, FetchError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            generation: self.generation.load(Ordering::SeqCst),
            run: Box::new(move || {
                Box::pin(async move {
                    let result = task().await;
                    let _ = reply_tx.send(result);
                })
            }),
        };

        if self.tx.send(job).is_err() {
            warn!("RateLimiter [{}]: dispatch loop is gone", self.name);
            return Err(FetchError::Cancelled);
        }

        // A job dropped by reset() drops its reply sender, which lands here.
        reply_rx.await.unwrap_or(Err(FetchError::Cancelled))
    }

    /// Abandon everything still queued: pending tasks settle as `Cancelled`
    /// and any deferred-dispatch timer is cut short. Tasks already executing
    /// run to completion; the call budget already spent stays spent so the
    /// rolling-window bound keeps holding across a reset.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.reset_notify.notify_waiters();
        debug!("RateLimiter [{}]: reset, pending queue abandoned", self.name);
    }
}

async fn dispatch_loop(
    name: String,
    mut rx: mpsc::UnboundedReceiver<Job>,
    max_calls: usize,
    window: Duration,
    generation: Arc<AtomicU64>,
    reset_notify: Arc<Notify>,
) {
    let mut window_start = Instant::now();
    let mut count = 0usize;

    'next_job: while let Some(job) = rx.recv().await {
        // Budget gate: wait for the window reset instant when exhausted.
        loop {
            if job.generation < generation.load(Ordering::SeqCst) {
                // Dropping the job settles its caller with Cancelled.
                continue 'next_job;
            }

            let now = Instant::now();
            if now.duration_since(window_start) >= window {
                window_start = now;
                count = 0;
            }
            if count < max_calls {
                break;
            }

            let reset_at = window_start + window;
            debug!(
                "RateLimiter [{}]: {} calls in window, deferring dispatch",
                name, count
            );
            tokio::select! {
                _ = time::sleep_until(reset_at) => {}
                _ = reset_notify.notified() => {}
            }
        }

        count += 1;
        (job.run)().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_fifo_order_and_all_settle() {
        let limiter = RateLimiter::new("test", 100, Duration::from_secs(60));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..10usize {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .enqueue(move || async move {
                        order.lock().unwrap().push(i);
                        Ok::<_, FetchError>(i)
                    })
                    .await
            }));
        }

        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap().unwrap(), i);
        }
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_settles_only_its_own_task() {
        let limiter = RateLimiter::new("test", 100, Duration::from_secs(60));

        let bad = limiter
            .enqueue(|| async { Err::<(), _>(FetchError::provider("X", "boom")) })
            .await;
        assert!(matches!(bad, Err(FetchError::Provider { .. })));

        let good = limiter.enqueue(|| async { Ok::<_, FetchError>(7) }).await;
        assert_eq!(good.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_budget_defers_excess_tasks() {
        let limiter = RateLimiter::new("test", 3, Duration::from_secs(60));
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .enqueue(move || async move {
                        stamps.lock().unwrap().push(Instant::now());
                        Ok::<_, FetchError>(())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 8);
        // any rolling 60s window holds at most 3 executions
        for i in 0..stamps.len() - 3 {
            assert!(
                stamps[i + 3].duration_since(stamps[i]) >= Duration::from_secs(60),
                "more than 3 dispatches inside one window"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_tasks() {
        let limiter = RateLimiter::new("test", 1, Duration::from_secs(60));

        // consumes the window budget immediately
        limiter
            .enqueue(|| async { Ok::<_, FetchError>(()) })
            .await
            .unwrap();

        let limiter2 = limiter.clone();
        let pending = tokio::spawn(async move {
            limiter2
                .enqueue(|| async { Ok::<_, FetchError>(()) })
                .await
        });
        tokio::task::yield_now().await;

        limiter.reset();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
