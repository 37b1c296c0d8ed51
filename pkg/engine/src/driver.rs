use chrono::{DateTime, Utc};
use pkg_constants::sim::DRIVER_POLL_INTERVAL_MS;
use pkg_types::{ApiError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::ControlPlane;

impl ControlPlane {
    /// Execute every task due at or before `until`, in `(fire_at, sequence)`
    /// order. A manual clock steps to each task's fire time, so tasks
    /// scheduled along the way run too if they fall inside the window.
    fn drain_until(&self, until: DateTime<Utc>) -> usize {
        let _executor = self.executor.lock();
        let mut executed = 0;
        loop {
            let ran = self.with_context(|ctx| {
                let Some((at, task)) = ctx.queue.pop_due(until) else {
                    return false;
                };
                self.clock.advance_to(at);
                ctx.now = ctx.now.max(at);
                ctx.execute(task);
                true
            });
            if !ran {
                break;
            }
            executed += 1;
        }
        self.clock.advance_to(until);
        if executed > 0 {
            debug!("executed {} lifecycle tasks up to {}", executed, until);
        }
        executed
    }

    /// Run everything due at the current clock time. Returns how many tasks
    /// ran.
    pub fn run_due(&self) -> usize {
        self.drain_until(self.clock.now())
    }

    /// Move simulated time forward by `d`, running every task that comes due.
    /// Only engines on a manual clock can be advanced.
    pub async fn advance(&self, d: Duration) -> Result<usize> {
        if !self.clock.is_manual() {
            return Err(ApiError::InvalidOperation(
                "cannot advance an engine running on the system clock".to_string(),
            ));
        }
        Ok(self.drain_until(self.clock.after(d)))
    }

    /// Drain due tasks on a fixed interval in the background.
    pub fn spawn_driver(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let poll = Duration::from_millis(DRIVER_POLL_INTERVAL_MS);
            info!("Lifecycle driver started (interval={}ms)", poll.as_millis());
            let mut interval = tokio::time::interval(poll);
            loop {
                interval.tick().await;
                engine.run_due();
            }
        })
    }
}
