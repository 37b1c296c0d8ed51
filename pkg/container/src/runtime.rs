use chrono::{DateTime, Utc};
use pkg_constants::network::{BRIDGE_GATEWAY, BRIDGE_NETWORK, BRIDGE_SUBNET_PREFIX};
use pkg_constants::runtime::{KILLED_EXIT_CODE, START_FAILURE_EXIT_CODE};
use pkg_fault::FaultInjector;
use pkg_metrics::{MetricsRegistry, names};
use pkg_state::{EventLog, Objects};
use pkg_types::container::{Container, ContainerPhase, ContainerState, NetworkSettings};
use pkg_types::event::{EventType, ObjectReference};
use pkg_types::validate::validate_container_name;
use pkg_types::{ApiError, ObjectKey, Resource, ResourceKind, Result};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Simulated container engine. Borrows the object map for one critical
/// section; every method is a complete, synchronous transition.
pub struct ContainerRuntime<'a> {
    pub(crate) objects: &'a mut Objects,
    pub(crate) events: &'a EventLog,
    pub(crate) faults: &'a FaultInjector,
    pub(crate) metrics: &'a MetricsRegistry,
    pub(crate) now: DateTime<Utc>,
}

/// Containers in key order. Without `all`, only those that are up
/// (running, paused or restarting), like `docker ps`.
pub fn list_containers(objects: &Objects, namespace: Option<&str>, all: bool) -> Vec<Container> {
    objects
        .containers(namespace)
        .filter(|c| all || c.state.status.is_active())
        .cloned()
        .collect()
}

impl<'a> ContainerRuntime<'a> {
    pub fn new(
        objects: &'a mut Objects,
        events: &'a EventLog,
        faults: &'a FaultInjector,
        metrics: &'a MetricsRegistry,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            objects,
            events,
            faults,
            metrics,
            now,
        }
    }

    pub(crate) fn record(
        &self,
        event_type: EventType,
        reason: &str,
        message: impl Into<String>,
        object: ObjectReference,
    ) {
        self.events
            .record(self.now, event_type, reason, message, object);
    }

    fn get(&self, namespace: &str, name: &str) -> Result<&Container> {
        self.objects
            .get(&ObjectKey::new(ResourceKind::Container, namespace, name))
            .and_then(|r| r.as_container())
            .ok_or_else(|| ApiError::NotFound(ObjectKey::new(ResourceKind::Container, namespace, name)))
    }

    fn get_mut(&mut self, namespace: &str, name: &str) -> Result<&mut Container> {
        self.objects
            .container_mut(namespace, name)
            .ok_or_else(|| ApiError::NotFound(ObjectKey::new(ResourceKind::Container, namespace, name)))
    }

    // ─── Container Lifecycle ────────────────────────────────────────

    /// Pull the image if it is not cached, then persist the container in
    /// `created`. A failed pull persists nothing.
    pub fn create(&mut self, mut container: Container) -> Result<Container> {
        validate_container_name(&container.metadata.name)?;
        let key = ObjectKey::new(
            ResourceKind::Container,
            &container.metadata.namespace,
            &container.metadata.name,
        );
        if self.objects.contains(&key) {
            return Err(ApiError::AlreadyExists(key));
        }

        info!(
            "Creating container: {}/{}, image={}",
            key.namespace, key.name, container.config.image
        );

        let image = match self.pull_image(&container.config.image) {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    "Container {}/{}: image pull failed: {}",
                    key.namespace, key.name, e
                );
                self.record(
                    EventType::Warning,
                    "Failed",
                    format!("Error creating container: {}", e),
                    ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
                );
                return Err(e);
            }
        };

        container.image_id = image.id;
        container.state = ContainerState::default();
        container.network_settings = NetworkSettings {
            network: BRIDGE_NETWORK.to_string(),
            gateway: Some(BRIDGE_GATEWAY.to_string()),
            ..Default::default()
        };
        container.metadata.stamp(self.faults.uid(), self.now);

        self.objects.insert(container.clone().into());
        Ok(container)
    }

    /// Start a created or exited container. A start failure is recorded on
    /// the container (`exited`, exit code 1), not returned as an error.
    pub fn start(&mut self, namespace: &str, name: &str) -> Result<Container> {
        let current = self.get(namespace, name)?;
        match current.state.status {
            ContainerPhase::Running => return Ok(current.clone()),
            ContainerPhase::Paused => {
                return Err(ApiError::InvalidOperation(format!(
                    "container {}/{} is paused, unpause it instead",
                    namespace, name
                )));
            }
            ContainerPhase::Dead => {
                return Err(ApiError::InvalidOperation(format!(
                    "container {}/{} is dead and cannot be started",
                    namespace, name
                )));
            }
            ContainerPhase::Created | ContainerPhase::Exited | ContainerPhase::Restarting => {}
        }

        let image_present = self.objects.images().any(|i| i.id == current.image_id);
        let free_host = self.free_bridge_host();
        let now = self.now;

        if !image_present {
            let container = self.get_mut(namespace, name)?;
            let error = format!("image {} is no longer present", container.config.image);
            container.state.status = ContainerPhase::Dead;
            container.state.pid = None;
            container.state.error = Some(error.clone());
            container.state.finished_at = Some(now);
            let container = container.clone();
            warn!("Container {}/{}: {} → dead", namespace, name, error);
            self.record(
                EventType::Warning,
                "Failed",
                error,
                ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
            );
            return Ok(container);
        }

        let started = self.faults.container_start_succeeds() && free_host.is_some();
        let pid = self.faults.range_u64(1000, 65535) as u32;

        let container = self.get_mut(namespace, name)?;
        if let (true, Some(host)) = (started, free_host) {
            let [a, b, c] = BRIDGE_SUBNET_PREFIX;
            container.state.status = ContainerPhase::Running;
            container.state.pid = Some(pid);
            container.state.exit_code = None;
            container.state.error = None;
            container.state.started_at = Some(now);
            container.state.finished_at = None;
            container.network_settings.ip_address = Some(format!("{}.{}.{}.{}", a, b, c, host));
            container.network_settings.mac_address =
                Some(format!("02:42:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, host));
            container.network_settings.ports = container.config.ports.clone();
            let container = container.clone();
            info!("Container {}/{} started (pid {})", namespace, name, pid);
            self.record(
                EventType::Normal,
                "Started",
                format!("Started container {}", name),
                ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
            );
            return Ok(container);
        }

        let error = format!(
            "OCI runtime create failed: simulated start failure for image {}",
            container.config.image
        );
        container.state.status = ContainerPhase::Exited;
        container.state.pid = None;
        container.state.exit_code = Some(START_FAILURE_EXIT_CODE);
        container.state.error = Some(error.clone());
        container.state.finished_at = Some(now);
        clear_network(&mut container.network_settings);
        let container = container.clone();
        warn!("Container {}/{} failed to start: {}", namespace, name, error);
        self.metrics.counter_inc(names::SIMULATED_FAILURES);
        self.record(
            EventType::Warning,
            "Failed",
            error,
            ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
        );
        Ok(container)
    }

    /// Follow-up of [`ContainerRuntime::restart`]. A no-op unless the same
    /// container is still waiting in `restarting`.
    pub fn resume_after_restart(&mut self, namespace: &str, name: &str, uid: &str) -> Option<Container> {
        let current = self.get(namespace, name).ok()?;
        if current.metadata.uid != uid || current.state.status != ContainerPhase::Restarting {
            return None;
        }
        self.start(namespace, name).ok()
    }

    /// Graceful stop. Stopping a container that is not up is a no-op.
    pub fn stop(&mut self, namespace: &str, name: &str) -> Result<Container> {
        let now = self.now;
        let container = self.get_mut(namespace, name)?;
        if !container.state.status.is_active() {
            return Ok(container.clone());
        }
        container.state.status = ContainerPhase::Exited;
        container.state.exit_code = Some(0);
        container.state.pid = None;
        container.state.finished_at = Some(now);
        clear_network(&mut container.network_settings);
        let container = container.clone();
        info!("Container {}/{} stopped", namespace, name);
        self.record(
            EventType::Normal,
            "Stopped",
            format!("Stopped container {}", name),
            ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
        );
        Ok(container)
    }

    pub fn kill(&mut self, namespace: &str, name: &str) -> Result<Container> {
        let now = self.now;
        let container = self.get_mut(namespace, name)?;
        if !container.state.status.is_active() {
            return Err(ApiError::InvalidOperation(format!(
                "container {}/{} is not running",
                namespace, name
            )));
        }
        container.state.status = ContainerPhase::Exited;
        container.state.exit_code = Some(KILLED_EXIT_CODE);
        container.state.pid = None;
        container.state.finished_at = Some(now);
        clear_network(&mut container.network_settings);
        let container = container.clone();
        info!("Container {}/{} killed", namespace, name);
        self.record(
            EventType::Normal,
            "Killed",
            format!("Killed container {}", name),
            ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
        );
        Ok(container)
    }

    pub fn pause(&mut self, namespace: &str, name: &str) -> Result<Container> {
        let container = self.get_mut(namespace, name)?;
        if container.state.status != ContainerPhase::Running {
            return Err(ApiError::InvalidOperation(format!(
                "container {}/{} is {}, only running containers can be paused",
                namespace, name, container.state.status
            )));
        }
        container.state.status = ContainerPhase::Paused;
        let container = container.clone();
        self.record(
            EventType::Normal,
            "Paused",
            format!("Paused container {}", name),
            ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
        );
        Ok(container)
    }

    pub fn unpause(&mut self, namespace: &str, name: &str) -> Result<Container> {
        let container = self.get_mut(namespace, name)?;
        if container.state.status != ContainerPhase::Paused {
            return Err(ApiError::InvalidOperation(format!(
                "container {}/{} is not paused",
                namespace, name
            )));
        }
        container.state.status = ContainerPhase::Running;
        let container = container.clone();
        self.record(
            EventType::Normal,
            "Unpaused",
            format!("Unpaused container {}", name),
            ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
        );
        Ok(container)
    }

    /// Move the container to `restarting`. The caller schedules the start
    /// that follows ([`ContainerRuntime::resume_after_restart`]).
    pub fn restart(&mut self, namespace: &str, name: &str) -> Result<Container> {
        let container = self.get_mut(namespace, name)?;
        if container.state.status == ContainerPhase::Dead {
            return Err(ApiError::InvalidOperation(format!(
                "container {}/{} is dead and cannot be restarted",
                namespace, name
            )));
        }
        container.state.status = ContainerPhase::Restarting;
        container.state.restart_count += 1;
        container.state.pid = None;
        clear_network(&mut container.network_settings);
        let container = container.clone();
        info!(
            "Container {}/{} restarting (restart #{})",
            namespace, name, container.state.restart_count
        );
        self.record(
            EventType::Normal,
            "Restarting",
            format!("Restarting container {}", name),
            ObjectReference::from_meta(ResourceKind::Container, &container.metadata),
        );
        Ok(container)
    }

    /// Remove a container. Containers that are up need `force`.
    pub fn remove(&mut self, namespace: &str, name: &str, force: bool) -> Result<Container> {
        let current = self.get(namespace, name)?;
        if current.state.status.is_active() && !force {
            return Err(ApiError::InvalidOperation(format!(
                "cannot remove container {}/{}: container is {}; stop it first or force removal",
                namespace, name, current.state.status
            )));
        }
        let key = ObjectKey::new(ResourceKind::Container, namespace, name);
        let removed = self
            .objects
            .remove(&key)
            .and_then(|r| match r {
                Resource::Container(c) => Some(c),
                _ => None,
            })
            .ok_or(ApiError::NotFound(key))?;
        info!("Container {}/{} removed", namespace, name);
        Ok(removed)
    }

    /// Stop every container that is up. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let active: Vec<(String, String)> = self
            .objects
            .containers(None)
            .filter(|c| c.state.status.is_active())
            .map(|c| (c.metadata.namespace.clone(), c.metadata.name.clone()))
            .collect();
        active
            .iter()
            .filter(|(ns, name)| self.stop(ns, name).is_ok())
            .count()
    }

    /// Lowest free host octet on the bridge network.
    fn free_bridge_host(&self) -> Option<u8> {
        let used: BTreeSet<String> = self
            .objects
            .containers(None)
            .filter_map(|c| c.network_settings.ip_address.clone())
            .collect();
        let [a, b, c] = BRIDGE_SUBNET_PREFIX;
        (2..=254u8).find(|h| !used.contains(&format!("{}.{}.{}.{}", a, b, c, h)))
    }
}

fn clear_network(settings: &mut NetworkSettings) {
    settings.ip_address = None;
    settings.mac_address = None;
    settings.ports.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::ObjectMeta;
    use pkg_types::container::ContainerConfig;
    use pkg_types::fault::FaultProfile;

    struct Harness {
        objects: Objects,
        events: EventLog,
        faults: FaultInjector,
        metrics: MetricsRegistry,
    }

    impl Harness {
        fn new(profile: FaultProfile) -> Self {
            let mut objects = Objects::default();
            objects.insert(crate::seeded_image("nginx:latest", 187_000_000, Utc::now()).into());
            Self {
                objects,
                events: EventLog::new(),
                faults: FaultInjector::new(profile, Some(11)),
                metrics: MetricsRegistry::simulator(),
            }
        }

        fn runtime(&mut self) -> ContainerRuntime<'_> {
            ContainerRuntime::new(
                &mut self.objects,
                &self.events,
                &self.faults,
                &self.metrics,
                Utc::now(),
            )
        }
    }

    fn container(name: &str, image: &str) -> Container {
        Container::new(
            ObjectMeta::named("default", name),
            ContainerConfig {
                image: image.into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn create_then_start() {
        let mut h = Harness::new(FaultProfile::reliable());
        let mut rt = h.runtime();
        let created = rt.create(container("web", "nginx")).unwrap();
        assert_eq!(created.state.status, ContainerPhase::Created);
        assert!(!created.metadata.uid.is_empty());
        assert!(created.image_id.starts_with("sha256:"));

        let started = rt.start("default", "web").unwrap();
        assert_eq!(started.state.status, ContainerPhase::Running);
        assert!(started.state.pid.is_some());
        assert_eq!(started.network_settings.ip_address.as_deref(), Some("172.17.0.2"));
    }

    #[test]
    fn failed_pull_persists_nothing() {
        let mut h = Harness::new(FaultProfile {
            pull_success_rate: 0.0,
            ..FaultProfile::reliable()
        });
        let err = h.runtime().create(container("cache", "redis:7-alpine")).unwrap_err();
        assert!(matches!(err, ApiError::SimulatedFailure { .. }));
        assert!(h.objects.containers(None).next().is_none());
        assert!(h.objects.find_image("redis:7-alpine").is_none());
        assert!(
            h.events
                .list(Some("default"))
                .iter()
                .any(|e| e.event_type == EventType::Warning && e.involved_object.name == "cache")
        );
    }

    #[test]
    fn start_failure_is_recorded_on_container() {
        let mut h = Harness::new(FaultProfile {
            container_start_success_rate: 0.0,
            ..FaultProfile::reliable()
        });
        let mut rt = h.runtime();
        rt.create(container("web", "nginx:latest")).unwrap();
        let state = rt.start("default", "web").unwrap();
        assert_eq!(state.state.status, ContainerPhase::Exited);
        assert_eq!(state.state.exit_code, Some(START_FAILURE_EXIT_CODE));
        assert!(state.state.error.is_some());
        assert_eq!(h.metrics.counter_value(names::SIMULATED_FAILURES), Some(1));
    }

    #[test]
    fn running_container_needs_force_to_remove() {
        let mut h = Harness::new(FaultProfile::reliable());
        let mut rt = h.runtime();
        rt.create(container("web", "nginx:latest")).unwrap();
        rt.start("default", "web").unwrap();

        let err = rt.remove("default", "web", false).unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));
        assert!(rt.remove("default", "web", true).is_ok());
        assert!(matches!(
            rt.remove("default", "web", true),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn pause_kill_and_restart() {
        let mut h = Harness::new(FaultProfile::reliable());
        let mut rt = h.runtime();
        rt.create(container("web", "nginx:latest")).unwrap();
        rt.start("default", "web").unwrap();

        assert_eq!(rt.pause("default", "web").unwrap().state.status, ContainerPhase::Paused);
        assert!(rt.start("default", "web").is_err());
        assert!(rt.pause("default", "web").is_err());
        assert_eq!(rt.unpause("default", "web").unwrap().state.status, ContainerPhase::Running);

        let killed = rt.kill("default", "web").unwrap();
        assert_eq!(killed.state.exit_code, Some(KILLED_EXIT_CODE));
        assert!(killed.network_settings.ip_address.is_none());
        assert!(rt.kill("default", "web").is_err());

        let restarting = rt.restart("default", "web").unwrap();
        assert_eq!(restarting.state.status, ContainerPhase::Restarting);
        assert_eq!(restarting.state.restart_count, 1);
        let uid = restarting.metadata.uid.clone();
        let resumed = rt.resume_after_restart("default", "web", &uid).unwrap();
        assert_eq!(resumed.state.status, ContainerPhase::Running);
        assert!(rt.resume_after_restart("default", "web", &uid).is_none());
    }

    #[test]
    fn stop_all_and_list() {
        let mut h = Harness::new(FaultProfile::reliable());
        let mut rt = h.runtime();
        for name in ["a", "b", "c"] {
            rt.create(container(name, "nginx:latest")).unwrap();
        }
        rt.start("default", "a").unwrap();
        rt.start("default", "b").unwrap();

        assert_eq!(list_containers(&*rt.objects, None, false).len(), 2);
        assert_eq!(list_containers(&*rt.objects, None, true).len(), 3);
        assert_eq!(rt.stop_all(), 2);
        assert!(list_containers(&*rt.objects, Some("default"), false).is_empty());
        let a = rt.stop("default", "a").unwrap();
        assert_eq!(a.state.exit_code, Some(0));
    }

    #[test]
    fn missing_image_leaves_container_dead() {
        let mut h = Harness::new(FaultProfile::reliable());
        let mut rt = h.runtime();
        rt.create(container("web", "nginx:latest")).unwrap();
        rt.remove_image("nginx:latest", true).unwrap();
        let dead = rt.start("default", "web").unwrap();
        assert_eq!(dead.state.status, ContainerPhase::Dead);
        assert!(rt.restart("default", "web").is_err());
    }
}
