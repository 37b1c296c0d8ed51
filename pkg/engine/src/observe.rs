use pkg_container::ContainerRuntime;
use pkg_metrics::names;
use pkg_types::container::ContainerPhase;
use pkg_types::event::{Event, Notification};
use pkg_types::fault::FaultProfile;
use pkg_types::pod::PodPhase;
use pkg_types::quota::{QuotaLimits, ResourceQuota};
use pkg_types::stats::{ContainerCounts, PodCounts, ResourceUsage, StatsSample};
use pkg_types::validate::validate_name;
use pkg_types::{ObjectKey, ResourceKind, Result};
use tokio::sync::broadcast;
use tracing::info;

use crate::ControlPlane;

// ─── Events & Stats ─────────────────────────────────────────────────

impl ControlPlane {
    /// Retained events, oldest first, optionally for one namespace.
    pub async fn list_events(&self, namespace: Option<&str>) -> Vec<Event> {
        self.faults.delay().await;
        self.events.list(namespace)
    }

    /// Retained events with a sequence number above `seq`.
    pub fn events_since(&self, seq: u64) -> Vec<Event> {
        self.events.events_since(seq)
    }

    /// Live feed of events and stats samples. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Latest stats sample of a running pod or container.
    pub async fn stats(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<StatsSample> {
        self.faults.delay().await;
        self.stats.latest(&ObjectKey::new(kind, namespace, name))
    }

    /// Cluster-wide counts and the sum of the latest samples.
    pub async fn resource_usage(&self) -> ResourceUsage {
        self.faults.delay().await;
        let objects = self.store.read();

        let mut pods = PodCounts::default();
        for pod in objects.pods(None) {
            pods.total += 1;
            match pod.status.phase {
                PodPhase::Pending => pods.pending += 1,
                PodPhase::Running { .. } => pods.running += 1,
                PodPhase::Succeeded => pods.succeeded += 1,
                PodPhase::Failed { .. } => pods.failed += 1,
                PodPhase::Unknown => pods.unknown += 1,
            }
        }

        let mut containers = ContainerCounts::default();
        for container in objects.containers(None) {
            containers.total += 1;
            match container.state.status {
                ContainerPhase::Running | ContainerPhase::Restarting => containers.running += 1,
                ContainerPhase::Paused => containers.paused += 1,
                ContainerPhase::Created | ContainerPhase::Exited | ContainerPhase::Dead => {
                    containers.stopped += 1
                }
            }
        }

        let samples = self.stats.all();
        ResourceUsage {
            pods,
            containers,
            deployments: objects.deployments(None).count(),
            services: objects.services(None).count(),
            images: objects.images().count(),
            cpu_percent: samples.iter().map(|s| s.cpu_percent).sum(),
            memory_usage_bytes: samples.iter().map(|s| s.memory_usage_bytes).sum(),
            memory_limit_bytes: samples.iter().map(|s| s.memory_limit_bytes).sum(),
        }
    }
}

// ─── Quotas ─────────────────────────────────────────────────────────

impl ControlPlane {
    pub async fn set_quota(&self, namespace: &str, limits: QuotaLimits) -> Result<ResourceQuota> {
        self.faults.delay().await;
        validate_name(namespace)?;
        self.store.quotas_mut().set(namespace, limits);
        info!("Quota for namespace {} set to {:?}", namespace, limits);
        Ok(self.quota_snapshot(namespace))
    }

    /// Limits in force for `namespace` together with current usage.
    pub async fn get_quota(&self, namespace: &str) -> ResourceQuota {
        self.faults.delay().await;
        self.quota_snapshot(namespace)
    }

    fn quota_snapshot(&self, namespace: &str) -> ResourceQuota {
        let objects = self.store.read();
        self.store.quotas().describe(&objects, namespace)
    }
}

// ─── Faults & Reset ─────────────────────────────────────────────────

impl ControlPlane {
    pub fn fault_profile(&self) -> FaultProfile {
        self.faults.profile()
    }

    pub fn set_fault_profile(&self, profile: FaultProfile) {
        self.faults.set_profile(profile);
    }

    pub fn simulate_network_partition(&self) -> FaultProfile {
        self.faults.simulate_network_partition()
    }

    pub fn simulate_network_failure(&self) -> FaultProfile {
        self.simulate_network_partition()
    }

    pub fn simulate_resource_exhaustion(&self) -> FaultProfile {
        self.faults.simulate_resource_exhaustion()
    }

    pub fn simulate_resource_contention(&self) -> FaultProfile {
        self.simulate_resource_exhaustion()
    }

    pub fn restore_normal_operation(&self) -> FaultProfile {
        self.faults.restore_normal_operation()
    }

    /// Stop every container, drop all state, reset the fault profile and
    /// reseed the default resources. Two resets with the same seed leave
    /// identical stores.
    pub async fn cleanup(&self) {
        let _executor = self.executor.lock();
        let now = self.clock.now();
        let mut objects = self.store.write();
        let stopped = ContainerRuntime::new(&mut objects, &self.events, &self.faults, &self.metrics, now).stop_all();
        objects.clear();
        self.store.quotas_mut().clear();
        self.queue.lock().clear();
        self.events.clear();
        self.stats.clear();
        self.faults.reset();
        self.scheduler.lock().reset();
        self.metrics.reset();
        drop(objects);

        self.bootstrap();
        self.metrics.gauge_set(names::PENDING_TASKS, self.queue.lock().len() as i64);
        info!("Cleanup complete ({} containers stopped)", stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::config::SimConfig;
    use pkg_types::event::EventType;
    use pkg_types::pod::{ContainerSpec, Pod, PodSpec};
    use pkg_types::{ObjectMeta, Resource};
    use std::time::Duration;

    fn pod(ns: &str, name: &str) -> Resource {
        Pod::new(
            ObjectMeta::named(ns, name),
            PodSpec {
                containers: vec![ContainerSpec::new("app", "busybox")],
                node_name: None,
            },
        )
        .into()
    }

    #[tokio::test]
    async fn usage_counts_seeded_workloads() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(3));
        let usage = cp.resource_usage().await;
        assert_eq!(usage.pods.running, 3);
        assert_eq!(usage.services, 1);
        assert_eq!(usage.images, 4);

        cp.create(pod("default", "p1")).await.unwrap();
        assert_eq!(cp.resource_usage().await.pods.pending, 1);
    }

    #[tokio::test]
    async fn stats_appear_after_a_tick() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(3));
        assert!(cp.stats(ResourceKind::Pod, "kube-system", "coredns").await.is_none());
        cp.advance(cp.config().tick_interval()).await.unwrap();
        let sample = cp.stats(ResourceKind::Pod, "kube-system", "coredns").await.unwrap();
        assert!(sample.cpu_percent >= 0.0 && sample.cpu_percent <= 100.0);
        assert!(cp.resource_usage().await.memory_usage_bytes > 0);
    }

    #[tokio::test]
    async fn subscribers_see_events() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(3));
        let mut rx = cp.subscribe();
        cp.create(pod("default", "p1")).await.unwrap();
        match rx.recv().await.unwrap() {
            Notification::Event(e) => {
                assert_eq!(e.event_type, EventType::Normal);
                assert_eq!(e.involved_object.name, "p1");
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[tokio::test]
    async fn events_since_skips_seen_entries() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(3));
        cp.create(pod("default", "p1")).await.unwrap();
        let seen = cp.list_events(None).await.last().map(|e| e.seq).unwrap();
        cp.create(pod("default", "p2")).await.unwrap();
        let fresh = cp.events_since(seen);
        assert!(!fresh.is_empty());
        assert!(fresh.iter().all(|e| e.involved_object.name == "p2"));
    }

    #[tokio::test]
    async fn presets_and_restore() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(3));
        let partition = cp.simulate_network_failure();
        assert_eq!(cp.fault_profile(), partition);
        assert!(partition.network_latency_ms > 0);
        cp.simulate_resource_contention();
        assert_eq!(cp.restore_normal_operation(), SimConfig::deterministic(3).faults);
    }

    #[tokio::test]
    async fn quota_reports_usage() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(3));
        cp.set_quota("ns1", QuotaLimits::pods(2)).await.unwrap();
        cp.create(pod("ns1", "p1")).await.unwrap();
        let quota = cp.get_quota("ns1").await;
        assert_eq!(quota.hard.max_pods, Some(2));
        assert_eq!(quota.used.pods, 1);
    }

    #[tokio::test]
    async fn cleanup_reseeds_identically() {
        let cp = ControlPlane::simulated(SimConfig::deterministic(8));
        let baseline = cp.list(ResourceKind::Pod, None, None).await.unwrap();

        cp.create(pod("default", "extra")).await.unwrap();
        cp.set_quota("default", QuotaLimits::pods(10)).await.unwrap();
        cp.simulate_network_partition();
        cp.advance(Duration::from_secs(30)).await.unwrap();

        cp.cleanup().await;
        assert_eq!(cp.fault_profile(), SimConfig::deterministic(8).faults);
        assert_eq!(cp.get_quota("default").await.hard, QuotaLimits::default());
        assert!(cp.list_events(None).await.is_empty());
        assert_eq!(cp.pending_tasks(), 1);

        let reseeded = cp.list(ResourceKind::Pod, None, None).await.unwrap();
        let names = |v: &[Resource]| -> Vec<(String, String)> {
            v.iter()
                .map(|r| (r.metadata().name.clone(), r.metadata().uid.clone()))
                .collect()
        };
        assert_eq!(names(&baseline), names(&reseeded));
    }
}
