//! Recurring timers behind a small trait, so polling can run on tokio or on a host-driven clock.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback invoked on every timer tick.
pub type Tick = Arc<dyn Fn() -> TickFuture + Send + Sync>;

/// Source of recurring ticks.
///
/// The first tick is due immediately, then one every `every`, until the returned handle is
/// cancelled or dropped. Ticks may overlap: a scheduler does not wait for the previous tick's
/// future to finish before starting the next one.
pub trait PollScheduler: Send + Sync {
    fn schedule(&self, every: Duration, tick: Tick) -> ScheduleHandle;
}

/// Cancels a scheduled tick source. Dropping the handle cancels as well.
pub struct ScheduleHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop future ticks. Idempotent. Ticks already running are not interrupted.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Ticks from a `tokio::time::interval`; each tick is spawned as its own task.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling task; `None` outside a tokio runtime.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl PollScheduler for TokioScheduler {
    fn schedule(&self, every: Duration, tick: Tick) -> ScheduleHandle {
        let every = every.max(Duration::from_millis(1));
        let spawner = self.handle.clone();
        let task = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                spawner.spawn(tick());
            }
        });
        ScheduleHandle::new(move || task.abort())
    }
}

struct Slot {
    id: u64,
    every: Duration,
    tick: Tick,
}

/// Host-driven scheduler: nothing runs until the host calls `fire`.
///
/// Suits hosts with their own frame or event loop, and simulated clocks. Every `fire` counts as
/// one elapsed interval for all registered tick sources.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    slots: Arc<Mutex<Vec<Slot>>>,
    next_id: Arc<AtomicU64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tick sources not yet cancelled.
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    /// Interval requested by the most recent tick source.
    pub fn interval(&self) -> Option<Duration> {
        self.lock().last().map(|s| s.every)
    }

    fn ticks(&self) -> Vec<Tick> {
        self.lock().iter().map(|s| Arc::clone(&s.tick)).collect()
    }

    /// Run one tick of every source to completion, in registration order.
    pub async fn fire(&self) {
        for tick in self.ticks() {
            tick().await;
        }
    }

    /// `fire` repeated `n` times.
    pub async fn fire_n(&self, n: usize) {
        for _ in 0..n {
            self.fire().await;
        }
    }

    /// Start one tick of every source on the tokio runtime without waiting for it.
    pub fn fire_detached(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.ticks().into_iter().map(|tick| tokio::spawn(tick())).collect()
    }
}

impl PollScheduler for ManualScheduler {
    fn schedule(&self, every: Duration, tick: Tick) -> ScheduleHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Slot { id, every, tick });
        let slots: Weak<Mutex<Vec<Slot>>> = Arc::downgrade(&self.slots);
        ScheduleHandle::new(move || {
            if let Some(slots) = slots.upgrade() {
                slots
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|s| s.id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> Tick {
        let counter = Arc::clone(counter);
        Arc::new(move || -> TickFuture {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn manual_fire_and_cancel() {
        let sched = ManualScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let mut handle = sched.schedule(Duration::from_millis(500), counting_tick(&count));
        assert_eq!(sched.active(), 1);
        assert_eq!(sched.interval(), Some(Duration::from_millis(500)));
        sched.fire_n(3).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
        handle.cancel();
        assert!(!handle.is_active());
        assert_eq!(sched.active(), 0);
        sched.fire().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn manual_drop_cancels() {
        let sched = ManualScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _handle = sched.schedule(Duration::from_secs(1), counting_tick(&count));
            assert_eq!(sched.active(), 1);
        }
        assert_eq!(sched.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_first_tick_is_immediate() {
        let sched = TokioScheduler::try_current().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = sched.schedule(Duration::from_secs(1), counting_tick(&count));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn try_current_outside_runtime() {
        assert!(TokioScheduler::try_current().is_none());
    }
}
