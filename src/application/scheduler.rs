//! Cancellable scheduled tasks, the only way timers are created in the crate.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A spawned timer that can be cancelled before it fires.
/// Dropping the handle cancels it as well.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Runs `job` once after `delay`.
    pub fn once<F>(name: &'static str, delay: Duration, job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = sleep(delay) => {
                    debug!(task = name, "timer fired");
                    job();
                }
            }
        });
        Self { token, handle }
    }

    /// Runs `job` every `period`, first after one full period, until
    /// cancelled or until `job` returns `Break`.
    pub fn every<F>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => {
                        debug!(task = name, "interval tick");
                        if job().is_break() {
                            break;
                        }
                    }
                }
            }
        });
        Self { token, handle }
    }

    /// Drives `work` (typically a feed listener) until it ends or is cancelled.
    pub fn watch<Fut>(name: &'static str, work: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => debug!(task = name, "watch cancelled"),
                _ = work => {}
            }
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
