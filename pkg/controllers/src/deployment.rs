use pkg_constants::sim::{MAX_DEPLOYMENT_REPLICAS, POD_NAME_SUFFIX_LEN};
use pkg_constants::state::POD_TEMPLATE_HASH_LABEL;
use pkg_metrics::names;
use pkg_types::deployment::{Deployment, DeploymentStatus, PodTemplate};
use pkg_types::event::EventType;
use pkg_types::pod::{Pod, PodPhase};
use pkg_types::{ApiError, ObjectKey, ObjectMeta, OwnerReference, Resource, ResourceKind, Result};
use tracing::{debug, info, warn};

use crate::{Context, Task, pod};

/// Fill in defaults and check the selector against the template.
///
/// Template labels default to `app=<name>`; an empty selector defaults to the
/// template labels. Every selector term must be satisfied by the template.
pub fn normalize(deploy: &mut Deployment) -> Result<()> {
    if deploy.spec.replicas > MAX_DEPLOYMENT_REPLICAS {
        return Err(ApiError::Invalid(format!(
            "deployment {} asks for {} replicas, at most {} are allowed",
            deploy.metadata.name, deploy.spec.replicas, MAX_DEPLOYMENT_REPLICAS
        )));
    }
    if deploy.spec.template.labels.is_empty() {
        deploy
            .spec
            .template
            .labels
            .insert("app".to_string(), deploy.metadata.name.clone());
    }
    if deploy.spec.selector.is_empty() {
        deploy.spec.selector = deploy.spec.template.labels.clone();
    }
    let mismatched = deploy
        .spec
        .selector
        .iter()
        .find(|(k, v)| deploy.spec.template.labels.get(*k) != Some(*v));
    if let Some((k, v)) = mismatched {
        return Err(ApiError::Invalid(format!(
            "selector {}={} does not match template labels of deployment {}",
            k, v, deploy.metadata.name
        )));
    }
    pod::validate_spec(&deploy.spec.template.spec)
}

/// Admit a Deployment together with all of its replicas. Quota is checked
/// for the whole batch, so either every pod is created or nothing is.
pub fn create(ctx: &mut Context<'_>, mut deploy: Deployment) -> Result<Deployment> {
    normalize(&mut deploy)?;
    let ns = deploy.metadata.namespace.clone();
    let replicas = deploy.spec.replicas as usize;
    ctx.quotas
        .admit_copies(ctx.objects, &ns, &deploy.spec.template.spec, replicas)?;

    deploy.metadata.stamp(ctx.faults.uid(), ctx.now);
    deploy.generation = 1;
    deploy.status = DeploymentStatus::default();
    ctx.objects.insert(deploy.clone().into());

    let pods = match create_pods(ctx, &deploy, replicas) {
        Ok(pods) => pods,
        Err(e) => {
            ctx.objects.remove(&ObjectKey::new(ResourceKind::Deployment, &ns, &deploy.metadata.name));
            return Err(e);
        }
    };
    deploy.status.replicas = pods.len() as u32;
    if let Some(stored) = ctx.objects.deployment_mut(&ns, &deploy.metadata.name) {
        stored.status.replicas = deploy.status.replicas;
    }

    info!(
        "Deployment {}/{}: created with {} replicas",
        ns, deploy.metadata.name, replicas
    );
    schedule_sync(ctx, &deploy);
    Ok(deploy)
}

fn schedule_sync(ctx: &mut Context<'_>, deploy: &Deployment) {
    let delay = ctx.config.deployment_settle_delay();
    ctx.schedule(
        delay,
        Task::SyncDeployment {
            namespace: deploy.metadata.namespace.clone(),
            name: deploy.metadata.name.clone(),
            uid: deploy.metadata.uid.clone(),
        },
    );
}

/// Create `count` more pods for `deploy`, all admitted by quota or none.
pub fn create_pods(ctx: &mut Context<'_>, deploy: &Deployment, count: usize) -> Result<Vec<Pod>> {
    let ns = &deploy.metadata.namespace;
    ctx.quotas
        .admit_copies(ctx.objects, ns, &deploy.spec.template.spec, count)?;

    let template_hash = compute_template_hash(&deploy.spec.template);
    let mut created = Vec::with_capacity(count);
    for _ in 0..count {
        let mut pod = new_pod(ctx, deploy, &template_hash);
        pod.metadata.stamp(ctx.faults.uid(), ctx.now);
        pod.status = pod::initial_status(&pod.spec);
        ctx.objects.insert(pod.clone().into());
        pod::schedule_start(ctx, &pod);

        debug!(
            "Deployment {}/{}: created pod {}",
            ns, deploy.metadata.name, pod.metadata.name
        );
        ctx.record(
            EventType::Normal,
            "SuccessfulCreate",
            format!("Created pod: {}", pod.metadata.name),
            ResourceKind::Deployment,
            &deploy.metadata,
        );
        ctx.metrics.counter_inc(names::OBJECTS_CREATED);
        created.push(pod);
    }
    Ok(created)
}

/// A pod from the template, named `<deployment>-<suffix>` with a suffix not
/// yet taken in the namespace.
fn new_pod(ctx: &Context<'_>, deploy: &Deployment, template_hash: &str) -> Pod {
    let ns = &deploy.metadata.namespace;
    let name = loop {
        let candidate = format!(
            "{}-{}",
            deploy.metadata.name,
            ctx.faults.name_suffix(POD_NAME_SUFFIX_LEN)
        );
        if ctx.objects.pod(ns, &candidate).is_none() {
            break candidate;
        }
    };

    let mut meta = ObjectMeta::named(ns, &name);
    meta.labels = deploy.spec.template.labels.clone();
    meta.labels
        .insert(POD_TEMPLATE_HASH_LABEL.to_string(), template_hash.to_string());
    meta.owner_references.push(OwnerReference {
        kind: ResourceKind::Deployment,
        name: deploy.metadata.name.clone(),
        uid: deploy.metadata.uid.clone(),
    });
    Pod::new(meta, deploy.spec.template.spec.clone())
}

/// Settle task: reconcile, and check again later while anything is still
/// converging.
pub fn sync(ctx: &mut Context<'_>, namespace: &str, name: &str, uid: &str) {
    let Some(deploy) = deployment(ctx, namespace, name) else {
        return;
    };
    if deploy.metadata.uid != uid {
        return;
    }
    if reconcile(ctx, namespace, name) {
        schedule_sync(ctx, &deploy);
    } else if let Some(d) = deployment(ctx, namespace, name) {
        info!(
            "Deployment {}/{} settled: {}/{} ready",
            namespace, name, d.status.ready_replicas, d.spec.replicas
        );
    }
}

fn deployment(ctx: &Context<'_>, namespace: &str, name: &str) -> Option<Deployment> {
    ctx.objects
        .get(&ObjectKey::new(ResourceKind::Deployment, namespace, name))
        .and_then(Resource::as_deployment)
        .cloned()
}

/// Scale owned pods toward `spec.replicas` and recompute status by polling
/// them. Returns true while the Deployment has not converged: pods still
/// pending or a replica count that could not be reached.
///
/// Failed pods keep counting as replicas; they are not replaced.
pub fn reconcile(ctx: &mut Context<'_>, namespace: &str, name: &str) -> bool {
    let Some(deploy) = deployment(ctx, namespace, name) else {
        return false;
    };
    let uid = deploy.metadata.uid.clone();
    let desired = deploy.spec.replicas as usize;

    let mut owned: Vec<(Option<chrono::DateTime<chrono::Utc>>, String)> = ctx
        .objects
        .owned_pods(namespace, &uid)
        .into_iter()
        .map(|p| (p.metadata.creation_timestamp, p.metadata.name.clone()))
        .collect();

    if owned.len() < desired {
        // Scale up: create missing pods
        let missing = desired - owned.len();
        match create_pods(ctx, &deploy, missing) {
            Ok(pods) => info!(
                "Deployment {}/{}: scaled up by {} pods",
                namespace,
                name,
                pods.len()
            ),
            Err(e) => {
                warn!("Deployment {}/{}: failed to create pods: {}", namespace, name, e);
                if matches!(e, ApiError::QuotaExceeded { .. }) {
                    ctx.metrics.counter_inc(names::QUOTA_REJECTIONS);
                }
                ctx.record(
                    EventType::Warning,
                    "FailedCreate",
                    format!("Error creating: {}", e),
                    ResourceKind::Deployment,
                    &deploy.metadata,
                );
            }
        }
    } else if owned.len() > desired {
        // Scale down: delete excess pods, newest first
        let excess = owned.len() - desired;
        owned.sort_unstable_by(|a, b| b.cmp(a));
        for (_, pod_name) in owned.into_iter().take(excess) {
            if pod::remove(ctx, namespace, &pod_name).is_some() {
                info!("Deployment {}/{}: deleted pod {}", namespace, name, pod_name);
                ctx.record(
                    EventType::Normal,
                    "SuccessfulDelete",
                    format!("Deleted pod: {}", pod_name),
                    ResourceKind::Deployment,
                    &deploy.metadata,
                );
                ctx.metrics.counter_inc(names::OBJECTS_DELETED);
            }
        }
    }

    // Recount pods for status update
    let pods = ctx.objects.owned_pods(namespace, &uid);
    let replicas = pods.len() as u32;
    let running = pods.iter().filter(|p| p.status.phase.is_running()).count() as u32;
    let pending = pods.iter().any(|p| p.status.phase == PodPhase::Pending);

    let Some(stored) = ctx.objects.deployment_mut(namespace, name) else {
        return false;
    };
    stored.status.replicas = replicas;
    stored.status.ready_replicas = running;
    stored.status.available_replicas = running;
    stored.status.observed_generation = stored.generation;

    pending || replicas as usize != desired
}

/// Merge an update into the stored Deployment. Labels, annotations and spec
/// are replaced; a spec change bumps `generation`. The selector is immutable.
pub fn apply_update(stored: &Deployment, mut incoming: Deployment) -> Result<Deployment> {
    incoming.metadata.name = stored.metadata.name.clone();
    normalize(&mut incoming)?;
    if incoming.spec.selector != stored.spec.selector {
        return Err(ApiError::Invalid(format!(
            "spec.selector of deployment {} is immutable",
            stored.metadata.name
        )));
    }

    let mut merged = stored.clone();
    merged.metadata.labels = incoming.metadata.labels;
    merged.metadata.annotations = incoming.metadata.annotations;
    if merged.spec != incoming.spec {
        merged.spec = incoming.spec;
        merged.generation += 1;
    }
    Ok(merged)
}

/// Reconcile right away after an update and keep syncing until settled.
pub fn resync(ctx: &mut Context<'_>, namespace: &str, name: &str) {
    reconcile(ctx, namespace, name);
    if let Some(deploy) = deployment(ctx, namespace, name) {
        schedule_sync(ctx, &deploy);
    }
}

/// Delete every pod owned by `deploy`. Pods that merely match its selector
/// are left alone.
pub fn cascade_delete(ctx: &mut Context<'_>, deploy: &Deployment) -> Vec<Pod> {
    let ns = &deploy.metadata.namespace;
    let owned: Vec<String> = ctx
        .objects
        .owned_pods(ns, &deploy.metadata.uid)
        .into_iter()
        .map(|p| p.metadata.name.clone())
        .collect();

    let removed: Vec<Pod> = owned
        .iter()
        .filter_map(|name| pod::remove(ctx, ns, name))
        .collect();
    for pod in &removed {
        ctx.record(
            EventType::Normal,
            "Killing",
            format!("Stopping pod {} owned by deployment {}", pod.metadata.name, deploy.metadata.name),
            ResourceKind::Pod,
            &pod.metadata,
        );
    }
    info!(
        "Deployment {}/{}: cascade deleted {} pods",
        ns,
        deploy.metadata.name,
        removed.len()
    );
    removed
}

/// Compute a simple hash of the pod template for change detection.
pub fn compute_template_hash(template: &PodTemplate) -> String {
    let json = serde_json::to_string(template).unwrap_or_default();
    let mut hash: u64 = 0;
    for byte in json.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u64);
    }
    // Ten hex digits, like the suffix of a generated ReplicaSet name
    format!("{:016x}", hash)[6..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use pkg_types::deployment::DeploymentSpec;
    use pkg_types::fault::FaultProfile;
    use pkg_types::pod::{ContainerSpec, PodSpec};
    use pkg_types::quota::QuotaLimits;
    use pkg_types::selector::LabelSelector;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn deployment_spec(name: &str, replicas: u32) -> Deployment {
        Deployment::new(
            ObjectMeta::named("ns1", name),
            DeploymentSpec {
                replicas,
                selector: BTreeMap::new(),
                template: PodTemplate {
                    labels: BTreeMap::new(),
                    spec: PodSpec {
                        containers: vec![ContainerSpec::new("web", "nginx:latest")],
                        node_name: None,
                    },
                },
            },
        )
    }

    fn settle(f: &mut Fixture) {
        f.run_for(Duration::from_secs(10));
    }

    #[test]
    fn oversized_replica_count_is_invalid() {
        let mut f = Fixture::new(FaultProfile::reliable());
        let err = create(&mut f.ctx(), deployment_spec("huge", u32::MAX)).unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
        assert_eq!(f.objects.pods(None).count(), 0);
        assert_eq!(f.objects.deployments(None).count(), 0);

        let stored = create(&mut f.ctx(), deployment_spec("web", 1)).unwrap();
        let mut scaled = stored.clone();
        scaled.spec.replicas = MAX_DEPLOYMENT_REPLICAS + 1;
        assert!(matches!(apply_update(&stored, scaled), Err(ApiError::Invalid(_))));
    }

    fn stored(f: &Fixture, name: &str) -> Deployment {
        f.objects
            .get(&ObjectKey::new(ResourceKind::Deployment, "ns1", name))
            .and_then(Resource::as_deployment)
            .cloned()
            .unwrap()
    }

    #[test]
    fn creates_exactly_replicas_owned_pods() {
        let mut f = Fixture::new(FaultProfile::reliable());
        let d = create(&mut f.ctx(), deployment_spec("d1", 3)).unwrap();
        assert_eq!(d.spec.selector.get("app").map(String::as_str), Some("d1"));

        let pods: Vec<&Pod> = f.objects.pods(Some("ns1")).collect();
        assert_eq!(pods.len(), 3);
        for p in &pods {
            assert!(p.metadata.name.starts_with("d1-"));
            assert_eq!(p.metadata.name.len(), "d1-".len() + POD_NAME_SUFFIX_LEN);
            assert!(p.metadata.is_owned_by(&d.metadata.uid));
            assert!(p.metadata.labels.contains_key(POD_TEMPLATE_HASH_LABEL));
            assert_eq!(p.metadata.labels["app"], "d1");
        }
    }

    #[test]
    fn settles_once_pods_run() {
        let mut f = Fixture::new(FaultProfile::reliable());
        create(&mut f.ctx(), deployment_spec("d1", 3)).unwrap();
        settle(&mut f);

        let d = stored(&f, "d1");
        assert_eq!(d.status.replicas, 3);
        assert_eq!(d.status.ready_replicas, 3);
        assert_eq!(d.status.available_replicas, 3);
        assert!(d.is_settled());
    }

    #[test]
    fn failed_pods_are_not_ready() {
        let mut f = Fixture::new(FaultProfile {
            pod_start_success_rate: 0.0,
            ..FaultProfile::reliable()
        });
        create(&mut f.ctx(), deployment_spec("d1", 2)).unwrap();
        settle(&mut f);
        let d = stored(&f, "d1");
        assert_eq!(d.status.replicas, 2);
        assert_eq!(d.status.ready_replicas, 0);
        assert_eq!(f.objects.pods(Some("ns1")).count(), 2);
    }

    #[test]
    fn quota_rejects_whole_deployment() {
        let mut f = Fixture::new(FaultProfile::reliable());
        f.quotas.set("ns1", QuotaLimits::pods(2));
        let err = create(&mut f.ctx(), deployment_spec("d1", 3)).unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded { .. }));
        assert!(f.objects.is_empty());
        assert!(f.queue.is_empty());
    }

    #[test]
    fn selector_must_match_template() {
        let mut f = Fixture::new(FaultProfile::reliable());
        let mut d = deployment_spec("d1", 1);
        d.spec.selector.insert("app".into(), "other".into());
        assert!(matches!(create(&mut f.ctx(), d), Err(ApiError::Invalid(_))));
    }

    #[test]
    fn scale_down_removes_newest_first() {
        let mut f = Fixture::new(FaultProfile::reliable());
        let d = create(&mut f.ctx(), deployment_spec("d1", 2)).unwrap();
        settle(&mut f);
        let originals: Vec<String> = f.objects.pods(Some("ns1")).map(|p| p.metadata.name.clone()).collect();

        let mut bigger = stored(&f, "d1");
        bigger.spec.replicas = 4;
        let merged = apply_update(&stored(&f, "d1"), bigger).unwrap();
        assert_eq!(merged.generation, d.generation + 1);
        f.objects.insert(merged.into());
        resync(&mut f.ctx(), "ns1", "d1");
        assert_eq!(f.objects.pods(Some("ns1")).count(), 4);
        settle(&mut f);

        let mut smaller = stored(&f, "d1");
        smaller.spec.replicas = 2;
        let merged = apply_update(&stored(&f, "d1"), smaller).unwrap();
        f.objects.insert(merged.into());
        resync(&mut f.ctx(), "ns1", "d1");

        let mut left: Vec<String> = f.objects.pods(Some("ns1")).map(|p| p.metadata.name.clone()).collect();
        left.sort();
        let mut originals = originals;
        originals.sort();
        assert_eq!(left, originals);
        settle(&mut f);
        assert!(stored(&f, "d1").is_settled());
    }

    #[test]
    fn selector_is_immutable() {
        let mut f = Fixture::new(FaultProfile::reliable());
        create(&mut f.ctx(), deployment_spec("d1", 1)).unwrap();
        let mut changed = stored(&f, "d1");
        changed.spec.template.labels.insert("tier".into(), "web".into());
        changed.spec.selector.insert("tier".into(), "web".into());
        assert!(apply_update(&stored(&f, "d1"), changed).is_err());
    }

    #[test]
    fn cascade_only_touches_owned_pods() {
        let mut f = Fixture::new(FaultProfile::reliable());
        let d = create(&mut f.ctx(), deployment_spec("d1", 3)).unwrap();
        // A bare pod that happens to carry the same labels
        let stray = Pod::new(
            ObjectMeta::named("ns1", "stray").with_label("app", "d1"),
            d.spec.template.spec.clone(),
        );
        pod::create(&mut f.ctx(), stray).unwrap();
        settle(&mut f);

        let selector: LabelSelector = "app=d1".parse().unwrap();
        let matching = f.objects.pods(Some("ns1")).filter(|p| selector.matches(&p.metadata.labels)).count();
        assert_eq!(matching, 4);

        let removed = cascade_delete(&mut f.ctx(), &d);
        assert_eq!(removed.len(), 3);
        let names: Vec<String> = f.objects.pods(Some("ns1")).map(|p| p.metadata.name.clone()).collect();
        assert_eq!(names, vec!["stray".to_string()]);
    }

    #[test]
    fn manually_deleted_pod_is_replaced() {
        let mut f = Fixture::new(FaultProfile::reliable());
        create(&mut f.ctx(), deployment_spec("d1", 2)).unwrap();
        settle(&mut f);
        let victim = f.objects.pods(Some("ns1")).next().unwrap().metadata.name.clone();
        pod::remove(&mut f.ctx(), "ns1", &victim);

        assert!(reconcile(&mut f.ctx(), "ns1", "d1"));
        assert_eq!(f.objects.pods(Some("ns1")).count(), 2);
        settle(&mut f);
        assert!(stored(&f, "d1").is_settled());
    }

    #[test]
    fn template_hash_is_stable() {
        let d = deployment_spec("d1", 1);
        let a = compute_template_hash(&d.spec.template);
        assert_eq!(a.len(), 10);
        assert_eq!(a, compute_template_hash(&d.spec.template));
        let mut other = d.spec.template.clone();
        other.spec.containers[0].image = "nginx:1.27".into();
        assert_ne!(a, compute_template_hash(&other));
    }
}
