//! Periodic flush task.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Background task calling a flush callback on a fixed interval.
///
/// The first tick fires one full interval after start. Cancellation is
/// cooperative: [`FlushScheduler::cancel`] only signals, and the task observes
/// it on its next wake. A tick already in progress is not interrupted; the
/// task ends once that callback returns. A callback returning
/// [`ControlFlow::Break`] also ends the task.
pub struct FlushScheduler {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushScheduler {
    pub fn start<F, Fut>(runtime: &Handle, interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let now = Instant::now();
            let first = now.checked_add(interval).unwrap_or_else(|| far_future(now));
            let mut ticker = tokio::time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    // Fires on cancel and when the scheduler handle is dropped
                    _ = cancel_rx.changed() => break,
                }
                if *cancel_rx.borrow() {
                    break;
                }
                if on_tick().await.is_break() {
                    break;
                }
            }
            tracing::debug!("Flush scheduler stopped");
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Flush scheduler started");
        Self { cancel_tx, handle }
    }

    /// Ask the task to stop. Never waits for it.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Roughly 30 years out, used when `now + interval` does not fit in an `Instant`.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn counting_scheduler(interval: Duration) -> (FlushScheduler, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let scheduler = FlushScheduler::start(&Handle::current(), interval, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });
        (scheduler, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let (scheduler, ticks) = counting_scheduler(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        scheduler.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticking() {
        let (scheduler, ticks) = counting_scheduler(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        scheduler.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_task() {
        let scheduler = FlushScheduler::start(&Handle::current(), Duration::from_secs(1), || async {
            ControlFlow::Break(())
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_does_not_panic() {
        let (scheduler, ticks) = counting_scheduler(Duration::from_secs(u64::MAX / 2));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!scheduler.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        scheduler.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_waits_for_tick_in_progress() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let (counter, release) = (Arc::clone(&ticks), Arc::clone(&gate));
        let scheduler = FlushScheduler::start(&Handle::current(), Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            let release = Arc::clone(&release);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        scheduler.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!scheduler.is_finished());

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let (scheduler, ticks) = counting_scheduler(Duration::from_secs(1));
        drop(scheduler);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
