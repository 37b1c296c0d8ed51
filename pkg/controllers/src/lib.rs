//! Lifecycle transitions driven by the task queue.
//!
//! Every transition runs with the object map write-locked and receives a
//! [`Context`] bundling that lock with the rest of the engine state it may
//! touch. Tasks carry the uid of their target and do nothing when the object
//! is gone or has been replaced.

pub mod deployment;
pub mod housekeeping;
pub mod pod;
pub mod service;

use chrono::{DateTime, Utc};
use pkg_container::ContainerRuntime;
use pkg_fault::FaultInjector;
use pkg_metrics::{MetricsRegistry, StatsEmitter, names};
use pkg_scheduler::{Scheduler, TaskQueue};
use pkg_state::{EventLog, Objects, QuotaBook};
use pkg_types::config::SimConfig;
use pkg_types::event::{EventType, ObjectReference};
use pkg_types::{ObjectMeta, ResourceKind};
use std::time::Duration;
use tracing::debug;

/// A pending transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Pending → Running or Failed.
    StartPod {
        namespace: String,
        name: String,
        uid: String,
    },
    /// Recount owned pods, scale, and retry while pods are pending.
    SyncDeployment {
        namespace: String,
        name: String,
        uid: String,
    },
    ProvisionLoadBalancer {
        namespace: String,
        name: String,
        uid: String,
    },
    /// Second half of a container restart.
    RestartContainer {
        namespace: String,
        name: String,
        uid: String,
    },
    /// Perturbation, stats, deployment resync and event pruning; reschedules
    /// itself every tick.
    Housekeeping,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::StartPod { .. } => "StartPod",
            Task::SyncDeployment { .. } => "SyncDeployment",
            Task::ProvisionLoadBalancer { .. } => "ProvisionLoadBalancer",
            Task::RestartContainer { .. } => "RestartContainer",
            Task::Housekeeping => "Housekeeping",
        }
    }
}

/// Everything a transition may read or mutate, borrowed for one critical
/// section.
pub struct Context<'a> {
    pub config: &'a SimConfig,
    pub now: DateTime<Utc>,
    pub objects: &'a mut Objects,
    pub quotas: &'a QuotaBook,
    pub queue: &'a mut TaskQueue<Task>,
    pub events: &'a EventLog,
    pub faults: &'a FaultInjector,
    pub scheduler: &'a mut Scheduler,
    pub metrics: &'a MetricsRegistry,
    pub stats: &'a StatsEmitter,
}

/// `now + delay`, saturating instead of overflowing.
pub fn fire_time(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Context<'_> {
    /// Queue `task` to fire `delay` after the current instant.
    pub fn schedule(&mut self, delay: Duration, task: Task) {
        let fire_at = fire_time(self.now, delay);
        debug!("scheduling {} at {}", task.name(), fire_at);
        self.queue.push(fire_at, task);
    }

    pub fn record(
        &self,
        event_type: EventType,
        reason: &str,
        message: impl Into<String>,
        kind: ResourceKind,
        meta: &ObjectMeta,
    ) {
        self.events.record(
            self.now,
            event_type,
            reason,
            message,
            ObjectReference::from_meta(kind, meta),
        );
    }

    pub fn runtime(&mut self) -> ContainerRuntime<'_> {
        ContainerRuntime::new(
            self.objects,
            self.events,
            self.faults,
            self.metrics,
            self.now,
        )
    }

    /// Run one dequeued task.
    pub fn execute(&mut self, task: Task) {
        self.metrics.counter_inc(names::TASKS_EXECUTED);
        match task {
            Task::StartPod {
                namespace,
                name,
                uid,
            } => pod::start(self, &namespace, &name, &uid),
            Task::SyncDeployment {
                namespace,
                name,
                uid,
            } => deployment::sync(self, &namespace, &name, &uid),
            Task::ProvisionLoadBalancer {
                namespace,
                name,
                uid,
            } => service::provision_load_balancer(self, &namespace, &name, &uid),
            Task::RestartContainer {
                namespace,
                name,
                uid,
            } => {
                self.runtime().resume_after_restart(&namespace, &name, &uid);
            }
            Task::Housekeeping => housekeeping::run(self),
        }
    }
}
