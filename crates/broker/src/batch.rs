//! Size- and timeout-triggered batching with guaranteed drain.
//!
//! One [`BatchBuffer`] per entity type. A size-triggered flush runs inline
//! on the enqueueing task (this is the backpressure path into the delivery
//! loop); a timeout-triggered flush runs on a one-shot timer task using
//! whatever cancellation context is installed at fire time, so a drain
//! context installed during shutdown also covers late timers.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Batching thresholds. `size` and `timeout` are two independent triggers:
/// under steady high load the size trigger wins and no timer is ever
/// scheduled; under trickle load the timer bounds latency.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub size: usize,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch buffer is not running")]
    NotRunning,
    #[error("batch buffer context cancelled")]
    Cancelled,
    #[error("batch flush failed: {0}")]
    Flush(String),
    #[error("drain failed: {0}")]
    Drain(String),
}

pub type FlushFn<T> =
    Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<(), BatchError>> + Send + Sync>;

struct Inner<T> {
    items: Vec<T>,
    timer: Option<Timer>,
    timer_seq: u64,
    ctx: Option<CancellationToken>,
}

struct Timer {
    seq: u64,
    handle: JoinHandle<()>,
}

struct Shared<T> {
    cfg: BatchConfig,
    entity: &'static str,
    flush_fn: FlushFn<T>,
    inner: Mutex<Inner<T>>,
}

/// Generic per-entity buffer with an internal mutex around bookkeeping
/// only; the mutex is never held across a flush.
pub struct BatchBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> BatchBuffer<T> {
    pub fn new(cfg: BatchConfig, entity: &'static str, flush_fn: FlushFn<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                entity,
                flush_fn,
                inner: Mutex::new(Inner {
                    items: Vec::new(),
                    timer: None,
                    timer_seq: 0,
                    ctx: None,
                }),
            }),
        }
    }

    /// Install or replace the context used for asynchronous flushes. A
    /// pending timer picks up the new context when it fires.
    pub fn set_context(&self, ctx: CancellationToken) {
        let mut inner = self.shared.lock();
        inner.ctx = Some(ctx);
    }

    /// Append one item. Returns only after any size-triggered flush has
    /// completed, propagating its result to the caller.
    pub async fn enqueue(&self, item: T) -> Result<(), BatchError> {
        let (batch, ctx) = {
            let mut inner = self.shared.lock();
            let ctx = match &inner.ctx {
                None => return Err(BatchError::NotRunning),
                Some(ctx) => ctx.clone(),
            };
            if ctx.is_cancelled() {
                return Err(BatchError::Cancelled);
            }

            inner.items.push(item);
            if inner.items.len() >= self.shared.cfg.size.max(1) {
                (Shared::take_batch_locked(&mut inner), ctx)
            } else {
                if inner.timer.is_none() && self.shared.cfg.timeout > Duration::ZERO {
                    let seq = inner.timer_seq.wrapping_add(1);
                    inner.timer_seq = seq;
                    inner.timer = Some(Timer {
                        seq,
                        handle: Shared::spawn_timer(&self.shared, seq),
                    });
                }
                return Ok(());
            }
        };

        self.shared.flush_with_context(&ctx, batch).await
    }

    /// Flush whatever is buffered using the given context. Safe to call
    /// with an already-cancelled context; the flush then fails cleanly.
    pub async fn drain(&self, ctx: &CancellationToken) -> Result<(), BatchError> {
        let batch = {
            let mut inner = self.shared.lock();
            Shared::take_batch_locked(&mut inner)
        };
        self.shared.flush_with_context(ctx, batch).await
    }
}

impl<T: Send + 'static> Shared<T> {
    fn spawn_timer(shared: &Arc<Self>, seq: u64) -> JoinHandle<()> {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            tokio::time::sleep(shared.cfg.timeout).await;

            let (batch, ctx) = {
                let mut inner = shared.lock();
                // A size-triggered flush may have raced this timer and
                // re-armed a newer one; a stale timer must not steal its
                // batch.
                let is_current = matches!(&inner.timer, Some(timer) if timer.seq == seq);
                if !is_current {
                    return;
                }
                inner.timer = None;
                (std::mem::take(&mut inner.items), inner.ctx.clone())
            };

            if batch.is_empty() {
                return;
            }
            let Some(ctx) = ctx else { return };
            if let Err(e) = shared.flush_with_context(&ctx, batch).await {
                warn!(entity = shared.entity, error = %e, "batch flush failed");
            }
        })
    }

    fn take_batch_locked(inner: &mut Inner<T>) -> Vec<T> {
        if let Some(timer) = inner.timer.take() {
            timer.handle.abort();
        }
        std::mem::take(&mut inner.items)
    }

    async fn flush_with_context(
        &self,
        ctx: &CancellationToken,
        batch: Vec<T>,
    ) -> Result<(), BatchError> {
        if batch.is_empty() {
            return Ok(());
        }
        let size = batch.len();
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(BatchError::Cancelled),
            result = (self.flush_fn)(batch) => result,
        };

        if result.is_ok() {
            debug!(
                entity = self.entity,
                size,
                took_ms = start.elapsed().as_millis() as u64,
                "flushed batch"
            );
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // The mutex guards bookkeeping only and is never held across
        // await, so poisoning can only come from a panic in this module.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    type Flushes = Arc<Mutex<Vec<Vec<u32>>>>;

    fn recording_buffer(
        size: usize,
        timeout: Duration,
    ) -> (BatchBuffer<u32>, Flushes, Arc<AtomicBool>) {
        let flushes: Flushes = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let flushes_in_fn = Arc::clone(&flushes);
        let fail_in_fn = Arc::clone(&fail);

        let flush_fn: FlushFn<u32> = Arc::new(move |batch: Vec<u32>| {
            let flushes = Arc::clone(&flushes_in_fn);
            let fail = Arc::clone(&fail_in_fn);
            Box::pin(async move {
                if fail.load(Ordering::SeqCst) {
                    return Err(BatchError::Flush("sink unavailable".into()));
                }
                flushes.lock().unwrap().push(batch);
                Ok(())
            })
        });

        let buffer = BatchBuffer::new(BatchConfig { size, timeout }, "test", flush_fn);
        (buffer, flushes, fail)
    }

    fn running(buffer: &BatchBuffer<u32>) -> CancellationToken {
        let ctx = CancellationToken::new();
        buffer.set_context(ctx.clone());
        ctx
    }

    #[tokio::test]
    async fn size_trigger_flushes_inline_with_exact_batch() {
        let (buffer, flushes, _) = recording_buffer(3, Duration::from_secs(3600));
        running(&buffer);

        buffer.enqueue(1).await.unwrap();
        buffer.enqueue(2).await.unwrap();
        assert!(flushes.lock().unwrap().is_empty());

        buffer.enqueue(3).await.unwrap();
        // Flush happened before the third enqueue returned.
        assert_eq!(*flushes.lock().unwrap(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_trigger_flushes_partial_batch() {
        let (buffer, flushes, _) = recording_buffer(100, Duration::from_millis(50));
        running(&buffer);

        buffer.enqueue(1).await.unwrap();
        buffer.enqueue(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*flushes.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_size_and_timeout_triggers() {
        let (buffer, flushes, _) = recording_buffer(2, Duration::from_millis(100));
        running(&buffer);

        buffer.enqueue(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        buffer.enqueue(2).await.unwrap(); // size trigger
        tokio::time::sleep(Duration::from_millis(150)).await;
        buffer.enqueue(3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await; // timeout trigger

        assert_eq!(*flushes.lock().unwrap(), vec![vec![1, 2], vec![3]]);

        // No third flush shows up later.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(flushes.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_timer_is_armed() {
        let (buffer, flushes, _) = recording_buffer(100, Duration::from_millis(50));
        running(&buffer);

        for item in 0..5 {
            buffer.enqueue(item).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        // One flush with everything, not one flush per enqueue.
        assert_eq!(*flushes.lock().unwrap(), vec![vec![0, 1, 2, 3, 4]]);
    }

    #[tokio::test]
    async fn drain_flushes_buffered_items() {
        let (buffer, flushes, _) = recording_buffer(1000, Duration::from_secs(10));
        let ctx = running(&buffer);

        for item in 0..17 {
            buffer.enqueue(item).await.unwrap();
        }
        buffer.drain(&ctx).await.unwrap();

        let flushed = flushes.lock().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].len(), 17);
    }

    #[tokio::test]
    async fn drain_on_empty_buffer_is_a_no_op() {
        let (buffer, flushes, _) = recording_buffer(10, Duration::from_secs(10));
        let ctx = running(&buffer);

        buffer.drain(&ctx).await.unwrap();
        assert!(flushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_without_context_is_not_running() {
        let (buffer, _, _) = recording_buffer(10, Duration::ZERO);
        assert!(matches!(
            buffer.enqueue(1).await,
            Err(BatchError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn enqueue_after_cancellation_fails_and_buffers_nothing() {
        let (buffer, flushes, _) = recording_buffer(10, Duration::ZERO);
        let ctx = running(&buffer);
        ctx.cancel();

        assert!(matches!(
            buffer.enqueue(1).await,
            Err(BatchError::Cancelled)
        ));

        // A fresh context and drain must find the buffer empty.
        let drain_ctx = CancellationToken::new();
        buffer.set_context(drain_ctx.clone());
        buffer.drain(&drain_ctx).await.unwrap();
        assert!(flushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inline_flush_error_propagates_to_enqueuer() {
        let (buffer, _, fail) = recording_buffer(2, Duration::ZERO);
        running(&buffer);
        fail.store(true, Ordering::SeqCst);

        buffer.enqueue(1).await.unwrap();
        assert!(matches!(
            buffer.enqueue(2).await,
            Err(BatchError::Flush(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_uses_context_installed_at_fire_time() {
        let (buffer, flushes, _) = recording_buffer(100, Duration::from_millis(50));
        let stale = running(&buffer);

        buffer.enqueue(1).await.unwrap();

        // Shutdown: the run context is cancelled, but a fresh drain context
        // is installed before the timer fires.
        stale.cancel();
        buffer.set_context(CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(*flushes.lock().unwrap(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn order_is_preserved_within_a_batch() {
        let (buffer, flushes, _) = recording_buffer(5, Duration::ZERO);
        running(&buffer);

        for item in [9, 4, 7, 1, 8] {
            buffer.enqueue(item).await.unwrap();
        }
        assert_eq!(*flushes.lock().unwrap(), vec![vec![9, 4, 7, 1, 8]]);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_completeness_across_triggers() {
        let (buffer, flushes, _) = recording_buffer(3, Duration::from_millis(40));
        let ctx = running(&buffer);

        let mut accepted = 0;
        for item in 0..7 {
            if buffer.enqueue(item).await.is_ok() {
                accepted += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        buffer.drain(&ctx).await.unwrap();

        let total: usize = flushes.lock().unwrap().iter().map(Vec::len).sum();
        assert_eq!(total, accepted);
    }
}
