//! Drives the scheduler and the sync service on tokio timers.
//!
//! One interval task per event class, polled at the class's own interval,
//! plus one task that attempts a sync every cooldown window. Every task is
//! owned by the returned [`RunnerHandle`]; dropping or cancelling it aborts
//! them all, so no event fires against a torn-down context.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use veil_core::kv::KeyValueStore;
use veil_core::scheduler::EventClass;
use veil_sync::RemoteStore;

use crate::context::AppContext;

/// Spawns the timer tasks.
pub struct SchedulerRunner;

impl SchedulerRunner {
    /// Start polling every event class and the sync loop on the current runtime.
    pub fn spawn<S, R>(ctx: Arc<AppContext<S, R>>) -> RunnerHandle
    where
        S: KeyValueStore + 'static,
        R: RemoteStore + 'static,
    {
        let mut tasks = Vec::with_capacity(EventClass::ALL.len() + 1);

        for class in EventClass::ALL {
            let secs = class.policy(&ctx.config().scheduler).poll_interval_secs.max(1);
            let ctx = Arc::clone(&ctx);
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(secs));
                loop {
                    ticker.tick().await;
                    ctx.run_scheduled(class);
                }
            }));
        }

        let sync_secs = ctx.config().sync.cooldown_secs.max(1);
        let sync_ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(sync_secs));
            loop {
                ticker.tick().await;
                let outcome = sync_ctx.sync().await;
                debug!(?outcome, "Periodic sync");
            }
        }));

        info!(tasks = tasks.len(), "Scheduler runner started");
        RunnerHandle { tasks }
    }
}

/// Interval whose first tick is one full period away.
fn interval(period: Duration) -> time::Interval {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Owns the runner's tasks.
#[derive(Debug)]
pub struct RunnerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Abort every task. Idempotent.
    pub fn cancel(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Scheduler runner cancelled");
    }

    /// Whether any task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
