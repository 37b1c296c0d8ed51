use pkg_metrics::names;
use pkg_types::container::ContainerPhase;
use pkg_types::event::Notification;
use pkg_types::pod::PodPhase;
use tracing::debug;

use crate::{Context, Task, deployment, pod};

/// Periodic tick: crash some running pods, resync every Deployment, refresh
/// stats, prune old events and update gauges. Reschedules itself.
pub fn run(ctx: &mut Context<'_>) {
    let crashes = pod::perturb(ctx);

    let deployments: Vec<(String, String)> = ctx
        .objects
        .deployments(None)
        .map(|d| (d.metadata.namespace.clone(), d.metadata.name.clone()))
        .collect();
    for (ns, name) in &deployments {
        deployment::reconcile(ctx, ns, name);
    }

    let samples = ctx
        .stats
        .refresh(ctx.now, ctx.objects, ctx.faults, ctx.config.baseline_load);
    for sample in &samples {
        ctx.events.publish(Notification::Stats(sample.clone()));
    }

    let pruned = ctx.events.prune(ctx.now, ctx.config.event_retention());
    if pruned > 0 {
        ctx.metrics.counter_add(names::EVENTS_PRUNED, pruned as u64);
    }

    let running = ctx.objects.pods(None).filter(|p| p.status.phase.is_running()).count();
    let pending = ctx
        .objects
        .pods(None)
        .filter(|p| p.status.phase == PodPhase::Pending)
        .count();
    let containers = ctx
        .objects
        .containers(None)
        .filter(|c| c.state.status == ContainerPhase::Running)
        .count();
    ctx.metrics.gauge_set(names::PODS_RUNNING, running as i64);
    ctx.metrics.gauge_set(names::PODS_PENDING, pending as i64);
    ctx.metrics.gauge_set(names::CONTAINERS_RUNNING, containers as i64);

    let interval = ctx.config.tick_interval();
    ctx.schedule(interval, Task::Housekeeping);
    ctx.metrics.gauge_set(names::PENDING_TASKS, ctx.queue.len() as i64);

    debug!(
        "housekeeping: {} crashes, {} deployments, {} samples, {} events pruned",
        crashes,
        deployments.len(),
        samples.len(),
        pruned
    );
}
