use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pkg_constants::runtime::{DEFAULT_CONTAINER_MEMORY_LIMIT, DEFAULT_POD_MEMORY_LIMIT};
use pkg_fault::FaultInjector;
use pkg_state::Objects;
use pkg_types::{ObjectKey, ResourceKind};
use pkg_types::container::{Container, ContainerPhase};
use pkg_types::pod::Pod;
use pkg_types::stats::StatsSample;
use std::collections::BTreeMap;
use tracing::debug;

/// Spread of the jitter applied around the baseline load.
const LOAD_JITTER: f64 = 0.5;

/// Latest synthetic usage sample per running pod and container.
#[derive(Debug, Default)]
pub struct StatsEmitter {
    samples: Mutex<BTreeMap<ObjectKey, StatsSample>>,
}

impl StatsEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute a sample for everything currently running and forget the
    /// rest. Returns the fresh samples so the caller can publish them.
    pub fn refresh(
        &self,
        now: DateTime<Utc>,
        objects: &Objects,
        faults: &FaultInjector,
        baseline_load: f64,
    ) -> Vec<StatsSample> {
        let mut samples = self.samples.lock();
        let mut fresh = BTreeMap::new();

        let running_pods = objects.pods(None).filter(|p| p.status.phase.is_running());
        for pod in running_pods {
            let key = ObjectKey::new(ResourceKind::Pod, &pod.metadata.namespace, &pod.metadata.name);
            let sample = next_sample(
                key.clone(),
                now,
                pod_memory_limit(pod),
                samples.get(&key),
                faults,
                baseline_load,
            );
            fresh.insert(key, sample);
        }

        let running_containers = objects
            .containers(None)
            .filter(|c| c.state.status == ContainerPhase::Running);
        for container in running_containers {
            let key = ObjectKey::new(
                ResourceKind::Container,
                &container.metadata.namespace,
                &container.metadata.name,
            );
            let sample = next_sample(
                key.clone(),
                now,
                container_memory_limit(container),
                samples.get(&key),
                faults,
                baseline_load,
            );
            fresh.insert(key, sample);
        }

        let dropped = samples.keys().filter(|k| !fresh.contains_key(*k)).count();
        if dropped > 0 {
            debug!("stats: dropped {} samples for stopped resources", dropped);
        }
        *samples = fresh;
        samples.values().cloned().collect()
    }

    pub fn latest(&self, key: &ObjectKey) -> Option<StatsSample> {
        self.samples.lock().get(key).cloned()
    }

    pub fn all(&self) -> Vec<StatsSample> {
        self.samples.lock().values().cloned().collect()
    }

    pub fn forget(&self, key: &ObjectKey) {
        self.samples.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

fn pod_memory_limit(pod: &Pod) -> u64 {
    match pod.spec.requests().memory_bytes {
        0 => DEFAULT_POD_MEMORY_LIMIT,
        bytes => bytes,
    }
}

fn container_memory_limit(container: &Container) -> u64 {
    container
        .config
        .memory_limit_bytes
        .filter(|b| *b > 0)
        .unwrap_or(DEFAULT_CONTAINER_MEMORY_LIMIT)
}

/// CPU and memory jitter around the baseline; network and disk counters are
/// cumulative, so they only grow from the previous sample.
fn next_sample(
    object: ObjectKey,
    now: DateTime<Utc>,
    memory_limit_bytes: u64,
    previous: Option<&StatsSample>,
    faults: &FaultInjector,
    baseline_load: f64,
) -> StatsSample {
    let load = faults.jitter(baseline_load, LOAD_JITTER).clamp(0.0, 1.0);
    let cpu_percent = (load * 100.0 * 100.0).round() / 100.0;
    let memory_fraction = faults.jitter(baseline_load, LOAD_JITTER).clamp(0.01, 1.0);
    let memory_usage_bytes = (memory_limit_bytes as f64 * memory_fraction) as u64;

    let grow = |prev: Option<u64>, max: u64| {
        prev.unwrap_or(0).saturating_add(faults.range_u64(0, max))
    };

    StatsSample {
        object,
        timestamp: now,
        cpu_percent,
        memory_usage_bytes,
        memory_limit_bytes,
        network_rx_bytes: grow(previous.map(|s| s.network_rx_bytes), 512 * 1024),
        network_tx_bytes: grow(previous.map(|s| s.network_tx_bytes), 256 * 1024),
        disk_read_bytes: grow(previous.map(|s| s.disk_read_bytes), 1024 * 1024),
        disk_write_bytes: grow(previous.map(|s| s.disk_write_bytes), 512 * 1024),
    }
}
