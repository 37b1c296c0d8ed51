use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use pkg_constants::state::REGISTRY_PREFIX;
use pkg_types::container::Container;
use pkg_types::deployment::Deployment;
use pkg_types::image::Image;
use pkg_types::pod::Pod;
use pkg_types::quota::QuotaLimits;
use pkg_types::selector::LabelSelector;
use pkg_types::service::Service;
use pkg_types::{ObjectKey, Resource, ResourceKind};
use std::collections::BTreeMap;

use crate::quota::QuotaBook;

/// etcd-style registry key: `/registry/<plural>/<namespace>/<name>`, or
/// `/registry/<plural>/<name>` for cluster-scoped kinds.
pub fn registry_key(key: &ObjectKey) -> String {
    if key.namespace.is_empty() {
        format!("{}/{}/{}", REGISTRY_PREFIX, key.kind.plural(), key.name)
    } else {
        format!(
            "{}/{}/{}/{}",
            REGISTRY_PREFIX,
            key.kind.plural(),
            key.namespace,
            key.name
        )
    }
}

fn list_prefix(kind: ResourceKind, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if kind.is_namespaced() => {
            format!("{}/{}/{}/", REGISTRY_PREFIX, kind.plural(), ns)
        }
        _ => format!("{}/{}/", REGISTRY_PREFIX, kind.plural()),
    }
}

/// The object map itself. Handed out only behind a [`StateStore`] lock guard,
/// so every multi-step check-then-act happens under one critical section.
#[derive(Debug, Default)]
pub struct Objects {
    entries: BTreeMap<String, Resource>,
}

impl Objects {
    pub fn get(&self, key: &ObjectKey) -> Option<&Resource> {
        self.entries.get(&registry_key(key))
    }

    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut Resource> {
        self.entries.get_mut(&registry_key(key))
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.contains_key(&registry_key(key))
    }

    /// Store `resource` under its own key, returning whatever it replaced.
    pub fn insert(&mut self, resource: Resource) -> Option<Resource> {
        self.entries.insert(registry_key(&resource.key()), resource)
    }

    pub fn remove(&mut self, key: &ObjectKey) -> Option<Resource> {
        self.entries.remove(&registry_key(key))
    }

    /// All objects of `kind`, optionally restricted to one namespace, in key order.
    pub fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> impl Iterator<Item = &Resource> {
        let prefix = list_prefix(kind, namespace);
        self.entries
            .range(prefix.clone()..)
            .take_while(move |(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v)
    }

    pub fn keys(&self, kind: ResourceKind, namespace: Option<&str>) -> Vec<ObjectKey> {
        self.list(kind, namespace).map(Resource::key).collect()
    }

    pub fn pods(&self, namespace: Option<&str>) -> impl Iterator<Item = &Pod> {
        self.list(ResourceKind::Pod, namespace)
            .filter_map(Resource::as_pod)
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<&Pod> {
        self.get(&ObjectKey::new(ResourceKind::Pod, namespace, name))
            .and_then(Resource::as_pod)
    }

    pub fn pod_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Pod> {
        self.get_mut(&ObjectKey::new(ResourceKind::Pod, namespace, name))
            .and_then(Resource::as_pod_mut)
    }

    /// Pods carrying an owner reference to `owner_uid`.
    pub fn owned_pods(&self, namespace: &str, owner_uid: &str) -> Vec<&Pod> {
        self.pods(Some(namespace))
            .filter(|p| p.metadata.is_owned_by(owner_uid))
            .collect()
    }

    pub fn deployments(&self, namespace: Option<&str>) -> impl Iterator<Item = &Deployment> {
        self.list(ResourceKind::Deployment, namespace)
            .filter_map(Resource::as_deployment)
    }

    pub fn deployment_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Deployment> {
        self.get_mut(&ObjectKey::new(ResourceKind::Deployment, namespace, name))
            .and_then(Resource::as_deployment_mut)
    }

    pub fn services(&self, namespace: Option<&str>) -> impl Iterator<Item = &Service> {
        self.list(ResourceKind::Service, namespace)
            .filter_map(Resource::as_service)
    }

    pub fn service_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Service> {
        self.get_mut(&ObjectKey::new(ResourceKind::Service, namespace, name))
            .and_then(Resource::as_service_mut)
    }

    pub fn containers(&self, namespace: Option<&str>) -> impl Iterator<Item = &Container> {
        self.list(ResourceKind::Container, namespace)
            .filter_map(Resource::as_container)
    }

    pub fn container_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Container> {
        self.get_mut(&ObjectKey::new(ResourceKind::Container, namespace, name))
            .and_then(Resource::as_container_mut)
    }

    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.list(ResourceKind::Image, None)
            .filter_map(Resource::as_image)
    }

    /// Find a cached image by tag or by id.
    pub fn find_image(&self, reference: &str) -> Option<&Image> {
        self.images()
            .find(|i| i.has_tag(reference) || i.id == reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// In-memory resource store. Objects and quotas sit behind separate locks;
/// when both are needed the objects lock is always taken first.
#[derive(Debug)]
pub struct StateStore {
    objects: RwLock<Objects>,
    quotas: RwLock<QuotaBook>,
}

impl StateStore {
    pub fn new(default_quota: Option<QuotaLimits>) -> Self {
        Self {
            objects: RwLock::new(Objects::default()),
            quotas: RwLock::new(QuotaBook::new(default_quota)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Objects> {
        self.objects.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Objects> {
        self.objects.write()
    }

    pub fn quotas(&self) -> RwLockReadGuard<'_, QuotaBook> {
        self.quotas.read()
    }

    pub fn quotas_mut(&self) -> RwLockWriteGuard<'_, QuotaBook> {
        self.quotas.write()
    }

    /// Owned copy of one object; callers can never reach the stored value.
    pub fn get(&self, key: &ObjectKey) -> Option<Resource> {
        self.objects.read().get(key).cloned()
    }

    pub fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Vec<Resource> {
        self.objects
            .read()
            .list(kind, namespace)
            .filter(|r| selector.matches(&r.metadata().labels))
            .cloned()
            .collect()
    }
}
