pub mod stats;

pub use stats::StatsEmitter;

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Names of the metrics every engine registers.
pub mod names {
    pub const OBJECTS_CREATED: &str = "kubesim_objects_created_total";
    pub const OBJECTS_UPDATED: &str = "kubesim_objects_updated_total";
    pub const OBJECTS_DELETED: &str = "kubesim_objects_deleted_total";
    pub const QUOTA_REJECTIONS: &str = "kubesim_quota_rejections_total";
    pub const SIMULATED_FAILURES: &str = "kubesim_simulated_failures_total";
    pub const POD_CRASHES: &str = "kubesim_pod_crashes_total";
    pub const TASKS_EXECUTED: &str = "kubesim_tasks_executed_total";
    pub const EVENTS_PRUNED: &str = "kubesim_events_pruned_total";
    pub const PODS_RUNNING: &str = "kubesim_pods_running";
    pub const PODS_PENDING: &str = "kubesim_pods_pending";
    pub const CONTAINERS_RUNNING: &str = "kubesim_containers_running";
    pub const PENDING_TASKS: &str = "kubesim_pending_tasks";
}

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
}

/// Monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    help: String,
}

/// Value that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    help: String,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry pre-populated with the engine's counters and gauges.
    pub fn simulator() -> Self {
        let registry = Self::new();
        registry.register_counter(names::OBJECTS_CREATED, "Objects accepted by create");
        registry.register_counter(names::OBJECTS_UPDATED, "Objects replaced by update");
        registry.register_counter(names::OBJECTS_DELETED, "Objects removed, cascades included");
        registry.register_counter(names::QUOTA_REJECTIONS, "Creates and updates rejected by namespace quota");
        registry.register_counter(
            names::SIMULATED_FAILURES,
            "Failures injected into pod starts, pulls, container starts and provisioning",
        );
        registry.register_counter(names::POD_CRASHES, "Crashes injected into running pods");
        registry.register_counter(names::TASKS_EXECUTED, "Lifecycle tasks executed");
        registry.register_counter(names::EVENTS_PRUNED, "Events dropped by retention");
        registry.register_gauge(names::PODS_RUNNING, "Pods in phase Running");
        registry.register_gauge(names::PODS_PENDING, "Pods in phase Pending");
        registry.register_gauge(names::CONTAINERS_RUNNING, "Containers in state running");
        registry.register_gauge(names::PENDING_TASKS, "Lifecycle tasks waiting in the queue");
        registry
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        let mut counters = self.counters.write();
        counters.entry(name.to_string()).or_insert_with(|| Counter {
            value: AtomicU64::new(0),
            help: help.to_string(),
        });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        let mut gauges = self.gauges.write();
        gauges.entry(name.to_string()).or_insert_with(|| Gauge {
            value: AtomicI64::new(0),
            help: help.to_string(),
        });
    }

    /// Increment a counter by 1.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Increment a counter by a given amount.
    pub fn counter_add(&self, name: &str, val: u64) {
        let counters = self.counters.read();
        if let Some(c) = counters.get(name) {
            c.value.fetch_add(val, Ordering::Relaxed);
        }
    }

    pub fn counter_value(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .get(name)
            .map(|c| c.value.load(Ordering::Relaxed))
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        let gauges = self.gauges.read();
        if let Some(g) = gauges.get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.value.load(Ordering::Relaxed))
    }

    /// Zero every counter and gauge, keeping registrations.
    pub fn reset(&self) {
        for c in self.counters.read().values() {
            c.value.store(0, Ordering::Relaxed);
        }
        for g in self.gauges.read().values() {
            g.value.store(0, Ordering::Relaxed);
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        // Counters
        let counters = self.counters.read();
        for (name, counter) in counters.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                counter.value.load(Ordering::Relaxed)
            ));
        }

        // Gauges
        let gauges = self.gauges.read();
        for (name, gauge) in gauges.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, gauge.help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                gauge.value.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
