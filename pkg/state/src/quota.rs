use pkg_types::pod::{PodSpec, ResourceRequirements};
use pkg_types::quota::{QuotaLimits, QuotaUsage, ResourceQuota};
use pkg_types::{ApiError, Result};
use std::collections::HashMap;

use crate::store::Objects;

/// Per-namespace quota limits. Admission calls [`QuotaBook::admit_pods`]
/// while holding the objects write lock, so the count it checks is the
/// count the insert lands on.
#[derive(Debug, Default)]
pub struct QuotaBook {
    limits: HashMap<String, QuotaLimits>,
    default_limits: Option<QuotaLimits>,
}

impl QuotaBook {
    pub fn new(default_limits: Option<QuotaLimits>) -> Self {
        Self {
            limits: HashMap::new(),
            default_limits,
        }
    }

    pub fn set(&mut self, namespace: &str, limits: QuotaLimits) {
        self.limits.insert(namespace.to_string(), limits);
    }

    pub fn remove(&mut self, namespace: &str) -> Option<QuotaLimits> {
        self.limits.remove(namespace)
    }

    pub fn clear(&mut self) {
        self.limits.clear();
    }

    /// Limits in force for `namespace`, falling back to the configured default.
    pub fn limits(&self, namespace: &str) -> Option<QuotaLimits> {
        self.limits
            .get(namespace)
            .copied()
            .or(self.default_limits)
    }

    /// Current usage. Every stored pod counts, whatever its phase.
    pub fn usage(&self, objects: &Objects, namespace: &str) -> QuotaUsage {
        objects
            .pods(Some(namespace))
            .fold(QuotaUsage::default(), |mut used, pod| {
                let req = pod.spec.requests();
                used.pods = used.pods.saturating_add(1);
                used.cpu_millis = used.cpu_millis.saturating_add(req.cpu_millis);
                used.memory_bytes = used.memory_bytes.saturating_add(req.memory_bytes);
                used
            })
    }

    pub fn describe(&self, objects: &Objects, namespace: &str) -> ResourceQuota {
        ResourceQuota {
            namespace: namespace.to_string(),
            hard: self.limits(namespace).unwrap_or_default(),
            used: self.usage(objects, namespace),
        }
    }

    /// Check that `incoming` pods fit in `namespace` on top of what is already
    /// there. Nothing is mutated; the caller inserts on `Ok`.
    pub fn admit_pods(&self, objects: &Objects, namespace: &str, incoming: &[&PodSpec]) -> Result<()> {
        let Some(limits) = self.limits(namespace) else {
            return Ok(());
        };
        let used = self.usage(objects, namespace);
        let requested = incoming
            .iter()
            .fold(ResourceRequirements::default(), |acc, spec| {
                acc.saturating_add(spec.requests())
            });
        self.check(namespace, limits, used, incoming.len() as u64, requested)
    }

    /// Same as [`QuotaBook::admit_pods`] for `count` pods sharing one spec.
    pub fn admit_copies(&self, objects: &Objects, namespace: &str, spec: &PodSpec, count: usize) -> Result<()> {
        let Some(limits) = self.limits(namespace) else {
            return Ok(());
        };
        let used = self.usage(objects, namespace);
        let count = count as u64;
        let each = spec.requests();
        let requested = ResourceRequirements {
            cpu_millis: each.cpu_millis.saturating_mul(count),
            memory_bytes: each.memory_bytes.saturating_mul(count),
        };
        self.check(namespace, limits, used, count, requested)
    }

    /// Check that a stored pod whose spec changes from `current` to
    /// `replacement` still fits. The pod count is unchanged.
    pub fn admit_replacement(
        &self,
        objects: &Objects,
        namespace: &str,
        current: &PodSpec,
        replacement: &PodSpec,
    ) -> Result<()> {
        let Some(limits) = self.limits(namespace) else {
            return Ok(());
        };
        let mut used = self.usage(objects, namespace);
        let freed = current.requests();
        used.pods = used.pods.saturating_sub(1);
        used.cpu_millis = used.cpu_millis.saturating_sub(freed.cpu_millis);
        used.memory_bytes = used.memory_bytes.saturating_sub(freed.memory_bytes);
        self.check(namespace, limits, used, 1, replacement.requests())
    }

    fn check(
        &self,
        namespace: &str,
        limits: QuotaLimits,
        used: QuotaUsage,
        pods: u64,
        requested: ResourceRequirements,
    ) -> Result<()> {

        let exceeded = |resource: &'static str, used: u64, limit: u64| ApiError::QuotaExceeded {
            namespace: namespace.to_string(),
            resource,
            used,
            limit,
        };

        if let Some(max) = limits.max_pods
            && u64::from(used.pods).saturating_add(pods) > u64::from(max)
        {
            return Err(exceeded("pods", u64::from(used.pods), u64::from(max)));
        }
        if let Some(max) = limits.max_cpu_millis
            && used.cpu_millis.saturating_add(requested.cpu_millis) > max
        {
            return Err(exceeded("cpu", used.cpu_millis, max));
        }
        if let Some(max) = limits.max_memory_bytes
            && used.memory_bytes.saturating_add(requested.memory_bytes) > max
        {
            return Err(exceeded("memory", used.memory_bytes, max));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::ObjectMeta;
    use pkg_types::pod::{ContainerSpec, Pod, PodPhase};

    fn spec(cpu_millis: u64, memory_bytes: u64) -> PodSpec {
        let mut container = ContainerSpec::new("c", "busybox:latest");
        container.resources = ResourceRequirements {
            cpu_millis,
            memory_bytes,
        };
        PodSpec {
            containers: vec![container],
            node_name: None,
        }
    }

    fn insert_pod(objects: &mut Objects, ns: &str, name: &str, spec: PodSpec) {
        objects.insert(Pod::new(ObjectMeta::named(ns, name), spec).into());
    }

    #[test]
    fn unlimited_namespace_admits_everything() {
        let book = QuotaBook::default();
        let objects = Objects::default();
        let s = spec(100, 100);
        assert!(book.admit_pods(&objects, "ns1", &[&s; 50]).is_ok());
    }

    #[test]
    fn pod_count_limit() {
        let mut book = QuotaBook::default();
        book.set("ns1", QuotaLimits::pods(1));
        let mut objects = Objects::default();
        let s = spec(0, 0);

        assert!(book.admit_pods(&objects, "ns1", &[&s]).is_ok());
        insert_pod(&mut objects, "ns1", "p1", s.clone());

        let err = book.admit_pods(&objects, "ns1", &[&s]).unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "pods", .. }));
        // Other namespaces are unaffected.
        assert!(book.admit_pods(&objects, "ns2", &[&s]).is_ok());
    }

    #[test]
    fn batch_admission_is_all_or_nothing() {
        let mut book = QuotaBook::default();
        book.set("ns1", QuotaLimits::pods(2));
        let objects = Objects::default();
        let s = spec(0, 0);
        assert!(book.admit_pods(&objects, "ns1", &[&s, &s, &s]).is_err());
        assert!(book.admit_pods(&objects, "ns1", &[&s, &s]).is_ok());
    }

    #[test]
    fn copies_are_admitted_as_one_batch() {
        let mut book = QuotaBook::default();
        book.set(
            "ns1",
            QuotaLimits {
                max_pods: Some(4),
                max_cpu_millis: Some(1000),
                max_memory_bytes: None,
            },
        );
        let objects = Objects::default();
        assert!(book.admit_copies(&objects, "ns1", &spec(250, 0), 4).is_ok());
        let err = book.admit_copies(&objects, "ns1", &spec(300, 0), 4).unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "cpu", .. }));
        let err = book.admit_copies(&objects, "ns1", &spec(0, 0), 5).unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "pods", .. }));
    }

    #[test]
    fn cpu_and_memory_limits() {
        let mut book = QuotaBook::default();
        book.set(
            "ns1",
            QuotaLimits {
                max_pods: None,
                max_cpu_millis: Some(1000),
                max_memory_bytes: Some(1 << 30),
            },
        );
        let mut objects = Objects::default();
        insert_pod(&mut objects, "ns1", "p1", spec(800, 1 << 29));

        let err = book
            .admit_pods(&objects, "ns1", &[&spec(300, 0)])
            .unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "cpu", .. }));
        let err = book
            .admit_pods(&objects, "ns1", &[&spec(0, 1 << 30)])
            .unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "memory", .. }));
        assert!(book.admit_pods(&objects, "ns1", &[&spec(200, 1 << 29)]).is_ok());
    }

    #[test]
    fn failed_pods_still_count() {
        let mut book = QuotaBook::default();
        book.set("ns1", QuotaLimits::pods(1));
        let mut objects = Objects::default();
        insert_pod(&mut objects, "ns1", "p1", spec(0, 0));
        if let Some(p) = objects.pod_mut("ns1", "p1") {
            p.status.phase = PodPhase::Failed {
                reason: "ContainerCannotRun".into(),
                message: String::new(),
            };
        }
        assert!(book.admit_pods(&objects, "ns1", &[&spec(0, 0)]).is_err());
        assert_eq!(book.describe(&objects, "ns1").used.pods, 1);
    }

    #[test]
    fn replacement_is_checked_against_usage_without_the_old_spec() {
        let mut book = QuotaBook::default();
        book.set(
            "ns1",
            QuotaLimits {
                max_pods: Some(1),
                max_cpu_millis: Some(1000),
                max_memory_bytes: None,
            },
        );
        let mut objects = Objects::default();
        let current = spec(500, 0);
        insert_pod(&mut objects, "ns1", "p1", current.clone());

        assert!(book.admit_replacement(&objects, "ns1", &current, &spec(1000, 0)).is_ok());
        let err = book
            .admit_replacement(&objects, "ns1", &current, &spec(50_000, 0))
            .unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "cpu", .. }));
    }

    #[test]
    fn huge_requests_saturate_instead_of_overflowing() {
        let mut book = QuotaBook::default();
        book.set(
            "ns1",
            QuotaLimits {
                max_pods: Some(10),
                max_cpu_millis: None,
                max_memory_bytes: Some(u64::MAX),
            },
        );
        let mut objects = Objects::default();
        let huge = spec(u64::MAX, u64::MAX);
        assert!(book.admit_pods(&objects, "ns1", &[&huge]).is_ok());
        insert_pod(&mut objects, "ns1", "a", huge.clone());
        insert_pod(&mut objects, "ns1", "b", huge);

        let used = book.describe(&objects, "ns1").used;
        assert_eq!(used.memory_bytes, u64::MAX);
        assert_eq!(used.cpu_millis, u64::MAX);
        assert!(book.admit_pods(&objects, "ns1", &[&spec(0, 1)]).is_ok());

        book.set(
            "ns1",
            QuotaLimits {
                max_pods: None,
                max_cpu_millis: Some(u64::MAX - 1),
                max_memory_bytes: None,
            },
        );
        let err = book.admit_pods(&objects, "ns1", &[&spec(1, 0)]).unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { resource: "cpu", .. }));
    }

    #[test]
    fn default_limits_apply_without_explicit_quota() {
        let mut book = QuotaBook::new(Some(QuotaLimits::pods(3)));
        assert_eq!(book.limits("any").and_then(|l| l.max_pods), Some(3));
        book.set("any", QuotaLimits::pods(5));
        assert_eq!(book.limits("any").and_then(|l| l.max_pods), Some(5));
    }
}
