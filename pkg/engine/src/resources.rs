use pkg_constants::state::DEFAULT_NAMESPACE;
use pkg_controllers::{Context, deployment, pod, service};
use pkg_metrics::names;
use pkg_types::container::Container;
use pkg_types::deployment::Deployment;
use pkg_types::event::EventType;
use pkg_types::image::{Image, normalize_reference};
use pkg_types::pod::Pod;
use pkg_types::selector::LabelSelector;
use pkg_types::service::Service;
use pkg_types::validate::validate_name;
use pkg_types::{ApiError, ObjectKey, Resource, ResourceKind, Result};
use tracing::{info, warn};

use crate::ControlPlane;

/// Fill in the namespace and check the name before admission.
fn prepare(resource: &mut Resource) -> Result<()> {
    let kind = resource.kind();
    let meta = resource.metadata_mut();
    if kind.is_namespaced() {
        if meta.namespace.is_empty() {
            meta.namespace = DEFAULT_NAMESPACE.to_string();
        }
        validate_name(&meta.namespace)?;
        if kind != ResourceKind::Container {
            validate_name(&meta.name)?;
        }
    } else {
        meta.namespace.clear();
        meta.name = normalize_reference(&meta.name);
    }
    Ok(())
}

fn not_found(kind: ResourceKind, namespace: &str, name: &str) -> ApiError {
    ApiError::NotFound(ObjectKey::new(kind, namespace, name))
}

fn admit(ctx: &mut Context<'_>, resource: Resource) -> Result<Resource> {
    let key = resource.key();
    if ctx.objects.contains(&key) {
        return Err(ApiError::AlreadyExists(key));
    }
    match resource {
        Resource::Pod(p) => pod::create(ctx, p).map(Resource::from),
        Resource::Deployment(d) => deployment::create(ctx, d).map(Resource::from),
        Resource::Service(s) => service::create(ctx, s).map(Resource::from),
        Resource::Container(c) => {
            let mut runtime = ctx.runtime();
            let created = runtime.create(c)?;
            runtime
                .start(&created.metadata.namespace, &created.metadata.name)
                .map(Resource::from)
        }
        Resource::Image(i) => ctx.runtime().pull_image(&i.metadata.name).map(Resource::from),
    }
}

impl ControlPlane {
    /// Admit a new object. Pods start `Pending`, containers are pulled and
    /// started, images are pulled. Rejections leave the store untouched.
    pub async fn create(&self, mut resource: Resource) -> Result<Resource> {
        self.faults.delay().await;
        prepare(&mut resource)?;
        let key = resource.key();

        self.with_context(|ctx| match admit(ctx, resource) {
            Ok(created) => {
                info!("Created {}", key);
                ctx.record(
                    EventType::Normal,
                    "Created",
                    format!("Created {} {}", key.kind, key.name),
                    key.kind,
                    created.metadata(),
                );
                ctx.metrics.counter_inc(names::OBJECTS_CREATED);
                Ok(created)
            }
            Err(e) => {
                if matches!(e, ApiError::QuotaExceeded { .. }) {
                    ctx.metrics.counter_inc(names::QUOTA_REJECTIONS);
                }
                warn!("Rejected create of {}: {}", key, e);
                Err(e)
            }
        })
    }

    /// Owned copy of one object.
    pub async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Resource> {
        self.faults.delay().await;
        let name = if kind.is_namespaced() {
            name.to_string()
        } else {
            normalize_reference(name)
        };
        let key = ObjectKey::new(kind, namespace, &name);
        self.store.get(&key).ok_or(ApiError::NotFound(key))
    }

    /// Objects of `kind`, optionally restricted to one namespace and to
    /// those matching a label selector such as `app=web,tier`.
    pub async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<Resource>> {
        self.faults.delay().await;
        let selector = match selector {
            Some(s) => s.parse::<LabelSelector>()?,
            None => LabelSelector::everything(),
        };
        Ok(self.store.list(kind, namespace, &selector))
    }

    /// Replace labels, annotations and spec of an existing object. A non-zero
    /// `resourceVersion` must match the stored one.
    pub async fn update(&self, mut resource: Resource) -> Result<Resource> {
        self.faults.delay().await;
        prepare(&mut resource)?;
        let key = resource.key();

        self.with_context(|ctx| {
            let stored = ctx.objects.get(&key).cloned().ok_or_else(|| ApiError::NotFound(key.clone()))?;
            let expected = resource.metadata().resource_version;
            let actual = stored.metadata().resource_version;
            if expected != 0 && expected != actual {
                return Err(ApiError::Conflict {
                    key: key.clone(),
                    expected,
                    actual,
                });
            }

            let mut merged = merge(ctx, stored, resource)?;
            merged.metadata_mut().resource_version = actual + 1;
            ctx.objects.insert(merged.clone());
            if let Resource::Deployment(d) = &merged {
                deployment::resync(ctx, &d.metadata.namespace, &d.metadata.name);
            }

            info!("Updated {} (resourceVersion {})", key, actual + 1);
            ctx.record(
                EventType::Normal,
                "Updated",
                format!("Updated {} {}", key.kind, key.name),
                key.kind,
                merged.metadata(),
            );
            ctx.metrics.counter_inc(names::OBJECTS_UPDATED);
            ctx.objects
                .get(&key)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(key.clone()))
        })
    }

    /// Remove an object. Deployments take their owned pods with them;
    /// running containers and in-use images need `force`.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        force: bool,
    ) -> Result<Resource> {
        self.faults.delay().await;
        self.with_context(|ctx| {
            let removed = remove(ctx, kind, namespace, name, force)?;
            let key = removed.key();
            info!("Deleted {}", key);
            ctx.record(
                EventType::Normal,
                "Deleted",
                format!("Deleted {} {}", key.kind, key.name),
                key.kind,
                removed.metadata(),
            );
            ctx.metrics.counter_inc(names::OBJECTS_DELETED);
            Ok(removed)
        })
    }

    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        match self.get(ResourceKind::Pod, namespace, name).await? {
            Resource::Pod(p) => Ok(p),
            _ => Err(not_found(ResourceKind::Pod, namespace, name)),
        }
    }

    pub async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        match self.get(ResourceKind::Deployment, namespace, name).await? {
            Resource::Deployment(d) => Ok(d),
            _ => Err(not_found(ResourceKind::Deployment, namespace, name)),
        }
    }

    pub async fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        match self.get(ResourceKind::Service, namespace, name).await? {
            Resource::Service(s) => Ok(s),
            _ => Err(not_found(ResourceKind::Service, namespace, name)),
        }
    }

    pub async fn get_container(&self, namespace: &str, name: &str) -> Result<Container> {
        match self.get(ResourceKind::Container, namespace, name).await? {
            Resource::Container(c) => Ok(c),
            _ => Err(not_found(ResourceKind::Container, namespace, name)),
        }
    }

    pub async fn get_image(&self, reference: &str) -> Result<Image> {
        match self.get(ResourceKind::Image, "", reference).await? {
            Resource::Image(i) => Ok(i),
            _ => Err(not_found(ResourceKind::Image, "", reference)),
        }
    }

    pub async fn list_pods(&self, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<Pod>> {
        let pods = self.list(ResourceKind::Pod, namespace, selector).await?;
        Ok(pods
            .into_iter()
            .filter_map(|r| match r {
                Resource::Pod(p) => Some(p),
                _ => None,
            })
            .collect())
    }
}

/// Fold an update into the stored object, keeping identity and status.
fn merge(ctx: &mut Context<'_>, stored: Resource, incoming: Resource) -> Result<Resource> {
    match (stored, incoming) {
        (Resource::Pod(stored), Resource::Pod(incoming)) => {
            pod::apply_update(ctx, &stored, incoming).map(Resource::from)
        }
        (Resource::Deployment(stored), Resource::Deployment(incoming)) => {
            deployment::apply_update(&stored, incoming).map(Resource::from)
        }
        (Resource::Service(stored), Resource::Service(incoming)) => {
            service::apply_update(ctx, &stored, incoming).map(Resource::from)
        }
        (Resource::Container(stored), Resource::Container(incoming)) => {
            if normalize_reference(&incoming.config.image) != normalize_reference(&stored.config.image) {
                return Err(ApiError::Invalid(format!(
                    "image of container {} cannot change; create a new container",
                    stored.metadata.name
                )));
            }
            let mut merged = stored;
            merged.metadata.labels = incoming.metadata.labels;
            merged.metadata.annotations = incoming.metadata.annotations;
            merged.config = incoming.config;
            Ok(merged.into())
        }
        (Resource::Image(stored), Resource::Image(incoming)) => {
            let mut merged = stored;
            merged.metadata.labels = incoming.metadata.labels;
            merged.metadata.annotations = incoming.metadata.annotations;
            Ok(merged.into())
        }
        (stored, _) => Err(ApiError::Invalid(format!(
            "cannot change the kind of {}",
            stored.key()
        ))),
    }
}

fn remove(
    ctx: &mut Context<'_>,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
    force: bool,
) -> Result<Resource> {
    match kind {
        ResourceKind::Pod => pod::remove(ctx, namespace, name)
            .map(Resource::from)
            .ok_or_else(|| not_found(kind, namespace, name)),
        ResourceKind::Deployment => {
            let key = ObjectKey::new(kind, namespace, name);
            let deploy = ctx
                .objects
                .get(&key)
                .and_then(Resource::as_deployment)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(key.clone()))?;
            let pods = deployment::cascade_delete(ctx, &deploy);
            ctx.metrics.counter_add(names::OBJECTS_DELETED, pods.len() as u64);
            ctx.objects
                .remove(&key)
                .ok_or(ApiError::NotFound(key))
        }
        ResourceKind::Service => {
            let key = ObjectKey::new(kind, namespace, name);
            ctx.objects.remove(&key).ok_or(ApiError::NotFound(key))
        }
        ResourceKind::Container => ctx
            .runtime()
            .remove(namespace, name, force)
            .map(Resource::from),
        ResourceKind::Image => ctx.runtime().remove_image(name, force).map(Resource::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::ObjectMeta;
    use pkg_types::config::SimConfig;
    use pkg_types::pod::{ContainerSpec, PodSpec};
    use pkg_types::quota::QuotaLimits;

    fn engine() -> ControlPlane {
        ControlPlane::simulated(SimConfig {
            seed_defaults: false,
            ..SimConfig::deterministic(11)
        })
    }

    fn pod(name: &str) -> Resource {
        Pod::new(
            ObjectMeta::named("", name),
            PodSpec {
                containers: vec![ContainerSpec::new("app", "busybox")],
                node_name: None,
            },
        )
        .into()
    }

    #[tokio::test]
    async fn create_fills_default_namespace_and_identity() {
        let cp = engine();
        let created = cp.create(pod("web")).await.unwrap();
        let meta = created.metadata();
        assert_eq!(meta.namespace, "default");
        assert_eq!(meta.resource_version, 1);
        assert!(!meta.uid.is_empty());
        assert!(meta.creation_timestamp.is_some());

        let events = cp.list_events(Some("default")).await;
        assert!(events.iter().any(|e| e.reason == "Created" && e.involved_object.name == "web"));
    }

    #[tokio::test]
    async fn duplicate_and_invalid_names_are_rejected() {
        let cp = engine();
        cp.create(pod("web")).await.unwrap();
        assert!(matches!(cp.create(pod("web")).await, Err(ApiError::AlreadyExists(_))));
        assert!(matches!(cp.create(pod("Web_1")).await, Err(ApiError::Invalid(_))));
    }

    #[tokio::test]
    async fn update_checks_resource_version() {
        let cp = engine();
        let created = cp.create(pod("web")).await.unwrap();

        let mut stale = created.clone();
        stale.metadata_mut().resource_version = 7;
        assert!(matches!(cp.update(stale).await, Err(ApiError::Conflict { .. })));

        let mut labeled = created.clone();
        labeled.metadata_mut().labels.insert("tier".into(), "web".into());
        let updated = cp.update(labeled).await.unwrap();
        assert_eq!(updated.metadata().resource_version, 2);
        assert_eq!(updated.metadata().uid, created.metadata().uid);
        assert_eq!(updated.metadata().labels["tier"], "web");

        let mut unknown = pod("ghost");
        unknown.metadata_mut().namespace = "default".into();
        assert!(matches!(cp.update(unknown).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn pod_update_respects_cpu_quota() {
        let cp = engine();
        cp.set_quota(
            "default",
            QuotaLimits {
                max_pods: None,
                max_cpu_millis: Some(1000),
                max_memory_bytes: None,
            },
        )
        .await
        .unwrap();
        let mut small = pod("web");
        if let Resource::Pod(p) = &mut small {
            p.spec.containers[0].resources.cpu_millis = 500;
        }
        let created = cp.create(small).await.unwrap();

        let mut grown = created.clone();
        if let Resource::Pod(p) = &mut grown {
            p.spec.containers[0].resources.cpu_millis = 50_000;
            p.spec.containers.push(ContainerSpec::new("sidecar", "busybox"));
        }
        let err = cp.update(grown).await.unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { .. }));

        let quota = cp.get_quota("default").await;
        assert_eq!(quota.used.cpu_millis, 500);
        let stored = cp.get_pod("default", "web").await.unwrap();
        assert_eq!(stored.metadata.resource_version, 1);
        assert_eq!(stored.spec.containers.len(), 1);
    }

    #[tokio::test]
    async fn pod_update_keeps_statuses_in_step_with_containers() {
        let cp = engine();
        let created = cp.create(pod("web")).await.unwrap();
        let mut extended = created.clone();
        if let Resource::Pod(p) = &mut extended {
            p.spec.containers.push(ContainerSpec::new("sidecar", "busybox"));
        }
        let Resource::Pod(updated) = cp.update(extended).await.unwrap() else {
            panic!("expected a pod");
        };
        assert_eq!(updated.spec.containers.len(), 2);
        assert_eq!(updated.status.container_statuses.len(), 2);
    }

    #[tokio::test]
    async fn huge_memory_requests_do_not_overflow_quota() {
        let cp = engine();
        cp.set_quota(
            "ns1",
            QuotaLimits {
                max_pods: Some(10),
                max_cpu_millis: None,
                max_memory_bytes: Some(u64::MAX),
            },
        )
        .await
        .unwrap();
        for (name, memory_bytes) in [("a", u64::MAX), ("b", 1)] {
            let mut r = pod(name);
            r.metadata_mut().namespace = "ns1".into();
            if let Resource::Pod(p) = &mut r {
                p.spec.containers[0].resources.memory_bytes = memory_bytes;
            }
            cp.create(r).await.unwrap();
        }
        assert_eq!(cp.get_quota("ns1").await.used.memory_bytes, u64::MAX);
    }

    #[tokio::test]
    async fn bad_selector_is_invalid() {
        let cp = engine();
        let err = cp.list(ResourceKind::Pod, None, Some("a==b=c")).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let cp = engine();
        let err = cp.delete(ResourceKind::Service, "default", "nope", false).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
