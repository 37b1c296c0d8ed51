use pkg_metrics::names;
use pkg_types::event::EventType;
use pkg_types::pod::{ContainerStatus, Pod, PodPhase, PodSpec, PodStatus};
use pkg_types::validate::{validate_container_name, validate_image_reference};
use pkg_types::{ApiError, ObjectKey, Resource, ResourceKind, Result};
use tracing::{info, warn};

use crate::{Context, Task};

/// Reasons a pod start may fail with.
pub const START_FAILURE_REASONS: [&str; 4] = [
    "ContainerCannotRun",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerError",
];

/// Reasons injected into running pods by perturbation.
pub const CRASH_REASONS: [&str; 3] = ["OOMKilled", "CrashLoopBackOff", "ImagePullBackOff"];

/// `Pending`, with one not-ready status per container.
pub fn initial_status(spec: &PodSpec) -> PodStatus {
    PodStatus {
        phase: PodPhase::Pending,
        container_statuses: spec
            .containers
            .iter()
            .map(|c| ContainerStatus {
                name: c.name.clone(),
                ..Default::default()
            })
            .collect(),
    }
}

pub fn validate_spec(spec: &PodSpec) -> Result<()> {
    if spec.containers.is_empty() {
        return Err(ApiError::Invalid(
            "pod spec must declare at least one container".to_string(),
        ));
    }
    for container in &spec.containers {
        validate_container_name(&container.name)?;
        validate_image_reference(&container.image)?;
    }
    Ok(())
}

/// Admit a pod: quota, identity, `Pending` status, persist, and queue the
/// start transition. Fails before any mutation.
pub fn create(ctx: &mut Context<'_>, mut pod: Pod) -> Result<Pod> {
    validate_spec(&pod.spec)?;
    let ns = pod.metadata.namespace.clone();
    ctx.quotas.admit_pods(ctx.objects, &ns, &[&pod.spec])?;

    pod.metadata.stamp(ctx.faults.uid(), ctx.now);
    pod.spec.node_name = None;
    pod.status = initial_status(&pod.spec);
    ctx.objects.insert(pod.clone().into());
    schedule_start(ctx, &pod);
    Ok(pod)
}

/// Fold an update into a stored pod. The new spec is re-admitted against
/// namespace usage without the stored spec, and container statuses follow
/// the new container list. The node binding is kept.
pub fn apply_update(ctx: &mut Context<'_>, stored: &Pod, incoming: Pod) -> Result<Pod> {
    validate_spec(&incoming.spec)?;
    let ns = &stored.metadata.namespace;
    if let Err(e) = ctx
        .quotas
        .admit_replacement(ctx.objects, ns, &stored.spec, &incoming.spec)
    {
        ctx.metrics.counter_inc(names::QUOTA_REJECTIONS);
        return Err(e);
    }

    let mut merged = stored.clone();
    merged.metadata.labels = incoming.metadata.labels;
    merged.metadata.annotations = incoming.metadata.annotations;
    merged.spec.containers = incoming.spec.containers;
    let ready = merged.status.phase.is_running();
    merged.status.container_statuses = merged
        .spec
        .containers
        .iter()
        .map(|c| {
            stored
                .status
                .container_statuses
                .iter()
                .find(|s| s.name == c.name)
                .cloned()
                .unwrap_or_else(|| ContainerStatus {
                    name: c.name.clone(),
                    ready,
                    ..Default::default()
                })
        })
        .collect();
    Ok(merged)
}

/// Queue the Pending → Running/Failed transition after a random delay.
pub fn schedule_start(ctx: &mut Context<'_>, pod: &Pod) {
    let (min, max) = ctx.config.pod_start_delay_bounds();
    let delay = ctx.faults.delay_between(min, max);
    ctx.schedule(
        delay,
        Task::StartPod {
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            uid: pod.metadata.uid.clone(),
        },
    );
}

/// The single asynchronous transition out of `Pending`. A no-op for pods
/// that were deleted, replaced, or already left `Pending`.
pub fn start(ctx: &mut Context<'_>, namespace: &str, name: &str, uid: &str) {
    let Some(pod) = ctx.objects.pod(namespace, name) else {
        return;
    };
    if pod.metadata.uid != uid || pod.status.phase != PodPhase::Pending {
        return;
    }
    let pod = pod.clone();

    if !ctx.faults.pod_start_succeeds() {
        let reason = ctx
            .faults
            .pick(&START_FAILURE_REASONS)
            .copied()
            .unwrap_or(START_FAILURE_REASONS[0]);
        let message = format!("simulated start failure for pod {}/{}", namespace, name);
        fail(ctx, &pod, reason, &message);
        ctx.metrics.counter_inc(names::SIMULATED_FAILURES);
        return;
    }

    let placement = match ctx.scheduler.schedule(&pod) {
        Ok(placement) => placement,
        Err(e) => {
            fail(ctx, &pod, "FailedScheduling", &e.to_string());
            return;
        }
    };

    let now = ctx.now;
    let Some(stored) = ctx.objects.pod_mut(namespace, name) else {
        return;
    };
    stored.spec.node_name = Some(placement.node_name.clone());
    stored.status.phase = PodPhase::Running {
        host_ip: placement.host_ip.clone(),
        pod_ip: placement.pod_ip.clone(),
        started_at: now,
    };
    for status in &mut stored.status.container_statuses {
        status.ready = true;
    }
    let meta = stored.metadata.clone();

    info!(
        "Pod {}/{} → Running on {} ({})",
        namespace, name, placement.node_name, placement.pod_ip
    );
    ctx.record(
        EventType::Normal,
        "Scheduled",
        format!(
            "Successfully assigned {}/{} to {}",
            namespace, name, placement.node_name
        ),
        ResourceKind::Pod,
        &meta,
    );
    ctx.record(
        EventType::Normal,
        "Started",
        format!("Started {} container(s)", pod.spec.containers.len()),
        ResourceKind::Pod,
        &meta,
    );
}

fn fail(ctx: &mut Context<'_>, pod: &Pod, reason: &str, message: &str) {
    let ns = &pod.metadata.namespace;
    let name = &pod.metadata.name;
    let Some(stored) = ctx.objects.pod_mut(ns, name) else {
        return;
    };
    stored.status.phase = PodPhase::Failed {
        reason: reason.to_string(),
        message: message.to_string(),
    };
    for status in &mut stored.status.container_statuses {
        status.ready = false;
        status.last_termination_reason = Some(reason.to_string());
    }
    let meta = stored.metadata.clone();

    warn!("Pod {}/{} → Failed ({}): {}", ns, name, reason, message);
    ctx.record(
        EventType::Warning,
        if reason == "FailedScheduling" { reason } else { "Failed" },
        format!("{}: {}", reason, message),
        ResourceKind::Pod,
        &meta,
    );
}

/// Remove a pod and hand its placement back to the node pool.
pub fn remove(ctx: &mut Context<'_>, namespace: &str, name: &str) -> Option<Pod> {
    let key = ObjectKey::new(ResourceKind::Pod, namespace, name);
    let pod = match ctx.objects.remove(&key)? {
        Resource::Pod(pod) => pod,
        other => {
            ctx.objects.insert(other);
            return None;
        }
    };
    ctx.scheduler.release(namespace, name);
    ctx.stats.forget(&key);
    Some(pod)
}

/// Give every running pod an independent chance to crash. The pod stays
/// `Running`; one container's restart count grows. Returns the crash count.
pub fn perturb(ctx: &mut Context<'_>) -> usize {
    let running: Vec<(String, String)> = ctx
        .objects
        .pods(None)
        .filter(|p| p.status.phase.is_running())
        .map(|p| (p.metadata.namespace.clone(), p.metadata.name.clone()))
        .collect();

    let mut crashes = 0;
    for (ns, name) in running {
        if !ctx.faults.crashes() {
            continue;
        }
        let reason = ctx
            .faults
            .pick(&CRASH_REASONS)
            .copied()
            .unwrap_or(CRASH_REASONS[0]);
        let slot = {
            let count = ctx
                .objects
                .pod(&ns, &name)
                .map_or(0, |p| p.status.container_statuses.len());
            ctx.faults.range_u64(0, count.saturating_sub(1) as u64) as usize
        };

        let Some(pod) = ctx.objects.pod_mut(&ns, &name) else {
            continue;
        };
        let Some(status) = pod.status.container_statuses.get_mut(slot) else {
            continue;
        };
        status.restart_count += 1;
        status.last_termination_reason = Some(reason.to_string());
        let container = status.name.clone();
        let restarts = status.restart_count;
        let meta = pod.metadata.clone();

        warn!(
            "Pod {}/{}: container {} crashed ({}), restart #{}",
            ns, name, container, reason, restarts
        );
        ctx.record(
            EventType::Warning,
            "BackOff",
            format!(
                "Back-off restarting failed container {} in pod {} ({})",
                container, name, reason
            ),
            ResourceKind::Pod,
            &meta,
        );
        ctx.metrics.counter_inc(names::POD_CRASHES);
        crashes += 1;
    }
    crashes
}
