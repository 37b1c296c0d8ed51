//! The simulated control plane: one constructible engine holding the object
//! store, task queue, fault injector, event log and stats.
//!
//! Every public operation first waits out the injected network latency, then
//! runs as a single critical section over the store. Lifecycle transitions
//! are queued tasks drained by [`ControlPlane::run_due`], either from a
//! manual clock in tests or from [`ControlPlane::spawn_driver`] in a server.

mod containers;
mod driver;
mod observe;
mod resources;
mod seed;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pkg_constants::sim::SIM_EPOCH_SECS;
use pkg_controllers::{Context, Task};
use pkg_fault::FaultInjector;
use pkg_metrics::{MetricsRegistry, StatsEmitter};
use pkg_scheduler::{Clock, Scheduler, TaskQueue};
use pkg_state::{EventLog, StateStore};
use pkg_types::config::SimConfig;
use tracing::info;

pub struct ControlPlane {
    config: SimConfig,
    clock: Clock,
    store: StateStore,
    events: EventLog,
    faults: FaultInjector,
    scheduler: Mutex<Scheduler>,
    queue: Mutex<TaskQueue<Task>>,
    stats: StatsEmitter,
    metrics: MetricsRegistry,
    /// Held while draining the queue so transitions never interleave.
    executor: Mutex<()>,
}

impl ControlPlane {
    pub fn new(config: SimConfig, clock: Clock) -> Self {
        let engine = Self {
            clock,
            store: StateStore::new(config.default_quota),
            events: EventLog::new(),
            faults: FaultInjector::new(config.faults, config.seed),
            scheduler: Mutex::new(Scheduler::new(config.node_count)),
            queue: Mutex::new(TaskQueue::new()),
            stats: StatsEmitter::new(),
            metrics: MetricsRegistry::simulator(),
            executor: Mutex::new(()),
            config,
        };
        engine.bootstrap();
        info!(
            "Control plane ready (clock={}, seed={:?}, nodes={})",
            if engine.clock.is_manual() { "manual" } else { "system" },
            engine.config.seed,
            engine.config.node_count
        );
        engine
    }

    /// Engine on a manual clock starting at 2024-01-01T00:00:00Z. Time only
    /// moves through [`ControlPlane::advance`].
    pub fn simulated(config: SimConfig) -> Self {
        let start = DateTime::from_timestamp(SIM_EPOCH_SECS, 0).unwrap_or_default();
        Self::new(config, Clock::manual(start))
    }

    /// Engine on the system clock, for servers.
    pub fn realtime(config: SimConfig) -> Self {
        Self::new(config, Clock::System)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Number of lifecycle tasks waiting in the queue.
    pub fn pending_tasks(&self) -> usize {
        self.queue.lock().len()
    }

    /// Prometheus text rendering of the engine's counters and gauges.
    pub fn metrics(&self) -> String {
        self.metrics.render()
    }

    /// Seed default resources and queue the first housekeeping tick.
    fn bootstrap(&self) {
        self.with_context(|ctx| {
            if ctx.config.seed_defaults {
                seed::seed_defaults(ctx);
            }
            let interval = ctx.config.tick_interval();
            ctx.schedule(interval, Task::Housekeeping);
        });
    }

    /// Run `f` with the store write-locked and every other piece of engine
    /// state borrowed. Locks are taken in a fixed order: objects, quotas,
    /// queue, scheduler.
    fn with_context<R>(&self, f: impl FnOnce(&mut Context<'_>) -> R) -> R {
        let now = self.clock.now();
        let mut objects = self.store.write();
        let quotas = self.store.quotas();
        let mut queue = self.queue.lock();
        let mut scheduler = self.scheduler.lock();
        let mut ctx = Context {
            config: &self.config,
            now,
            objects: &mut objects,
            quotas: &quotas,
            queue: &mut queue,
            events: &self.events,
            faults: &self.faults,
            scheduler: &mut scheduler,
            metrics: &self.metrics,
            stats: &self.stats,
        };
        f(&mut ctx)
    }
}
