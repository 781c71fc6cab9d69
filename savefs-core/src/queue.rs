//! Single-flight, coalescing write queue.
//!
//! Wraps an async save function so it can be fed at any rate (for example
//! once per game tick) without overlapping saves:
//! - `enqueue` only overwrites a one-item pending slot; the newest item wins
//! - one drain task runs at a time and saves whatever is pending
//! - a failed save is retried with exponential backoff, then abandoned
//!
//! An abandoned item never blocks or drops a newer one: the drain loop moves
//! straight on to the pending slot.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

type SaveFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send>>;
type SaveFn<T, E> = Box<dyn Fn(T) -> SaveFuture<E> + Send + Sync>;
type ErrorHook<E> = Box<dyn Fn(&E, u32) + Send + Sync>;

/// Retry tuning for a [`CoalescingWriteQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueOptions {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_ms: u64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

impl QueueOptions {
    /// Total attempts per item, first try included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Something that can wait out a backoff delay.
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Waits on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug)]
struct Slot<T> {
    pending: Option<T>,
    in_flight: bool,
}

struct Shared<T, E> {
    slot: Mutex<Slot<T>>,
    save: SaveFn<T, E>,
    options: QueueOptions,
    on_error: Option<ErrorHook<E>>,
    backoff: Arc<dyn Backoff>,
    idle: watch::Sender<bool>,
}

impl<T, E> Shared<T, E>
where
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn lock_slot(&self) -> MutexGuard<'_, Slot<T>> {
        // The slot is never left half-updated, so a poisoned lock is still usable.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the pending item, or go idle if there is none.
    fn next_item(&self) -> Option<T> {
        let mut slot = self.lock_slot();
        let item = slot.pending.take();
        if item.is_none() {
            slot.in_flight = false;
            self.idle.send_replace(true);
        }
        item
    }

    /// Save one item, retrying until it succeeds or retries run out.
    async fn save_with_retries(&self, item: T) {
        let max_retries = self.options.max_retries;
        for attempt in 0..=max_retries {
            match (self.save)(item.clone()).await {
                Ok(()) => {
                    tracing::trace!(attempt, "snapshot saved");
                    return;
                }
                Err(e) => {
                    let retries_left = max_retries - attempt;
                    tracing::warn!(error = %e, attempt, retries_left, "snapshot save failed");
                    if let Some(hook) = &self.on_error {
                        hook(&e, retries_left);
                    }
                    if retries_left > 0 {
                        self.backoff.wait(self.options.delay_for(attempt)).await;
                    }
                }
            }
        }
        tracing::warn!(attempts = self.options.max_attempts(), "snapshot abandoned");
    }
}

/// Resets the queue if a drain task unwinds mid-save.
struct DrainGuard<T, E>
where
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    shared: Arc<Shared<T, E>>,
    finished: bool,
}

impl<T, E> Drop for DrainGuard<T, E>
where
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let restart = {
            let mut slot = self.shared.lock_slot();
            if slot.pending.is_some() {
                true
            } else {
                slot.in_flight = false;
                self.shared.idle.send_replace(true);
                false
            }
        };
        if restart {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(drain(self.shared.clone()));
            }
        }
    }
}

async fn drain<T, E>(shared: Arc<Shared<T, E>>)
where
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let mut guard = DrainGuard {
        shared,
        finished: false,
    };
    while let Some(item) = guard.shared.next_item() {
        guard.shared.save_with_retries(item).await;
    }
    guard.finished = true;
}

/// Coalescing, single-flight wrapper around an async save function.
///
/// Clone is cheap (just clones the Arc); clones feed the same queue.
/// `enqueue` spawns onto the current tokio runtime, so it must be called
/// from within one.
pub struct CoalescingWriteQueue<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for CoalescingWriteQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> CoalescingWriteQueue<T, E>
where
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Queue with default options and no error hook.
    pub fn new<F, Fut>(save: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        Self::builder(save).build()
    }

    pub fn builder<F, Fut>(save: F) -> WriteQueueBuilder<T, E>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        WriteQueueBuilder {
            save: Box::new(move |item| Box::pin(save(item))),
            options: QueueOptions::default(),
            on_error: None,
            backoff: Arc::new(TokioBackoff),
        }
    }

    /// Replace the pending item and make sure a drain task is running.
    pub fn enqueue(&self, item: T) {
        let start = {
            let mut slot = self.shared.lock_slot();
            slot.pending = Some(item);
            if slot.in_flight {
                false
            } else {
                slot.in_flight = true;
                self.shared.idle.send_replace(false);
                true
            }
        };
        if start {
            tokio::spawn(drain(self.shared.clone()));
        }
    }

    /// True when nothing is pending and no save is running.
    pub fn is_idle(&self) -> bool {
        *self.shared.idle.borrow()
    }

    /// Wait until the queue has drained.
    pub async fn idle(&self) {
        let mut rx = self.shared.idle.subscribe();
        // The sender lives in `shared`, so the channel cannot close here.
        let _ = rx.wait_for(|idle| *idle).await;
    }

    pub fn options(&self) -> QueueOptions {
        self.shared.options
    }
}

/// Builder for a [`CoalescingWriteQueue`].
pub struct WriteQueueBuilder<T, E> {
    save: SaveFn<T, E>,
    options: QueueOptions,
    on_error: Option<ErrorHook<E>>,
    backoff: Arc<dyn Backoff>,
}

impl<T, E> WriteQueueBuilder<T, E>
where
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    pub fn options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    /// Called after every failed attempt with the error and retries left.
    pub fn on_error<H>(mut self, hook: H) -> Self
    where
        H: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Swap the timer used between retries.
    pub fn backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> CoalescingWriteQueue<T, E> {
        let (idle, _) = watch::channel(true);
        CoalescingWriteQueue {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    pending: None,
                    in_flight: false,
                }),
                save: self.save,
                options: self.options,
                on_error: self.on_error,
                backoff: self.backoff,
                idle,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingBackoff {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Backoff for RecordingBackoff {
        async fn wait(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_delay_for_doubles() {
        let options = QueueOptions {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(options.delay_for(0), Duration::from_millis(500));
        assert_eq!(options.delay_for(1), Duration::from_millis(1000));
        assert_eq!(options.delay_for(3), Duration::from_millis(4000));
        assert_eq!(options.delay_for(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_max_attempts_saturates() {
        assert_eq!(QueueOptions::default().max_attempts(), 4);
        let unbounded = QueueOptions {
            max_retries: u32::MAX,
            backoff_ms: 1,
        };
        assert_eq!(unbounded.max_attempts(), u32::MAX);
    }

    #[tokio::test]
    async fn test_coalesces_burst() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = saved.clone();
        let queue = CoalescingWriteQueue::<u32, String>::new(move |n| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(n);
                Ok(())
            }
        });

        for n in 1..=5 {
            queue.enqueue(n);
        }
        queue.idle().await;

        let saved = saved.lock().unwrap();
        assert!(saved.len() <= 2);
        assert_eq!(saved.last(), Some(&5));
    }

    #[tokio::test]
    async fn test_retry_schedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let retries = Arc::new(Mutex::new(Vec::new()));
        let backoff = Arc::new(RecordingBackoff::default());

        let counter = calls.clone();
        let seen = retries.clone();
        let queue = CoalescingWriteQueue::builder(move |_: &'static str| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("save failed".to_string()) }
        })
        .options(QueueOptions {
            max_retries: 2,
            backoff_ms: 10,
        })
        .on_error(move |_, left| seen.lock().unwrap().push(left))
        .backoff(backoff.clone())
        .build();

        queue.enqueue("snapshot");
        queue.idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*retries.lock().unwrap(), vec![2, 1, 0]);
        assert_eq!(
            *backoff.delays.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_zero_retries_never_waits() {
        let backoff = Arc::new(RecordingBackoff::default());
        let queue = CoalescingWriteQueue::builder(|_: u8| async { Err::<(), _>("nope") })
            .options(QueueOptions {
                max_retries: 0,
                backoff_ms: 10,
            })
            .backoff(backoff.clone())
            .build();

        queue.enqueue(1);
        queue.idle().await;
        assert!(backoff.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_when_nothing_enqueued() {
        let queue = CoalescingWriteQueue::<u8, String>::new(|_| async { Ok(()) });
        assert!(queue.is_idle());
        queue.idle().await;
    }
}
