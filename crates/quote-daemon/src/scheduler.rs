//! Periodic sync scheduler.
//!
//! Fires a sync callback on a fixed interval. Each tick spawns the callback
//! as its own task so a slow pass never delays the timer; overlapping passes
//! are absorbed by the session's in-progress guard.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Shortest accepted sync interval.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Sync interval must be at least {min}s, got {got:?}", min = MIN_SYNC_INTERVAL.as_secs())]
    TooShort { got: Duration },
}

/// A sync interval known to be at least [`MIN_SYNC_INTERVAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInterval(Duration);

impl SyncInterval {
    pub fn new(period: Duration) -> Result<Self, IntervalError> {
        if period < MIN_SYNC_INTERVAL {
            return Err(IntervalError::TooShort { got: period });
        }
        Ok(Self(period))
    }

    pub fn from_secs(secs: u64) -> Result<Self, IntervalError> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn period(&self) -> Duration {
        self.0
    }
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running(SyncInterval),
}

struct Running {
    interval: SyncInterval,
    handle: JoinHandle<()>,
}

/// Runs `tick` every interval while started.
pub struct SyncScheduler<F> {
    tick: Arc<F>,
    running: Option<Running>,
}

impl<F, Fut> SyncScheduler<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(tick: F) -> Self {
        Self {
            tick: Arc::new(tick),
            running: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match &self.running {
            Some(running) => SchedulerState::Running(running.interval),
            None => SchedulerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start ticking every `interval`. Restarts if already running.
    ///
    /// The first tick fires one interval from now. Must be called inside a
    /// tokio runtime.
    pub fn start(&mut self, interval: SyncInterval) {
        self.stop();

        let period = interval.period();
        let tick = Arc::clone(&self.tick);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("Scheduled sync tick");
                tokio::spawn(tick());
            }
        });

        info!("Sync scheduler started ({}s interval)", period.as_secs());
        self.running = Some(Running { interval, handle });
    }

    /// Stop ticking. Passes already started run to completion.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
            info!("Sync scheduler stopped");
        }
    }

    /// Run one sync now, outside the schedule.
    pub fn trigger(&self) -> JoinHandle<()> {
        debug!("Manual sync trigger");
        tokio::spawn((self.tick)())
    }
}

impl<F> Drop for SyncScheduler<F> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (
        Arc<AtomicUsize>,
        SyncScheduler<impl Fn() -> std::future::Ready<()> + Send + Sync + 'static>,
    ) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let scheduler = SyncScheduler::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        });
        (count, scheduler)
    }

    #[test]
    fn test_interval_below_minimum_is_rejected() {
        assert_eq!(
            SyncInterval::from_secs(4),
            Err(IntervalError::TooShort {
                got: Duration::from_secs(4)
            })
        );
        assert!(SyncInterval::new(Duration::from_millis(4999)).is_err());
        assert_eq!(SyncInterval::from_secs(5).unwrap().period(), MIN_SYNC_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_interval() {
        let (count, mut scheduler) = counting();

        scheduler.start(SyncInterval::from_secs(5).unwrap());
        assert_eq!(scheduler.state(), SchedulerState::Running(SyncInterval::from_secs(5).unwrap()));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_ticks() {
        let (count, mut scheduler) = counting();

        scheduler.start(SyncInterval::from_secs(5).unwrap());
        tokio::time::sleep(Duration::from_secs(6)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_interval() {
        let (count, mut scheduler) = counting();

        scheduler.start(SyncInterval::from_secs(5).unwrap());
        scheduler.start(SyncInterval::from_secs(10).unwrap());
        tokio::time::sleep(Duration::from_secs(21)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_trigger_runs_immediately() {
        let (count, scheduler) = counting();

        scheduler.trigger().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }
}
