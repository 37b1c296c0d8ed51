use pkg_constants::network::{
    KUBERNETES_SERVICE_IP, LOAD_BALANCER_SUBNET_PREFIX, NODE_PORT_RANGE, SERVICE_CIDR_PREFIX,
};
use pkg_metrics::names;
use pkg_types::event::EventType;
use pkg_types::service::{LoadBalancerIngress, Service, ServiceStatus, ServiceType};
use pkg_types::{ApiError, ResourceKind, Result};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{info, warn};

use crate::{Context, Task};

fn cluster_ips_in_use(ctx: &Context<'_>) -> HashSet<String> {
    ctx.objects
        .services(None)
        .filter_map(|s| s.spec.cluster_ip.clone())
        .collect()
}

fn node_ports_in_use(ctx: &Context<'_>) -> HashSet<u16> {
    ctx.objects
        .services(None)
        .flat_map(|s| s.spec.ports.iter().filter_map(|p| p.node_port))
        .collect()
}

/// Lowest unused address in 10.96.0.0/16. 10.96.0.1 is reserved for the
/// `kubernetes` service.
fn allocate_cluster_ip(ctx: &Context<'_>, service_name: &str) -> Result<String> {
    let used = cluster_ips_in_use(ctx);
    let [a, b] = SERVICE_CIDR_PREFIX;
    (0..=255u16)
        .flat_map(|c| (1..=254u16).map(move |d| format!("{}.{}.{}.{}", a, b, c, d)))
        .find(|ip| !used.contains(ip) && (ip != KUBERNETES_SERVICE_IP || service_name == "kubernetes"))
        .ok_or_else(|| ApiError::Invalid("service cluster IP range exhausted".to_string()))
}

/// Validate a caller-supplied cluster IP or allocate one. ExternalName
/// services never get one.
fn assign_cluster_ip(ctx: &Context<'_>, svc: &mut Service) -> Result<()> {
    if matches!(svc.spec.service_type, ServiceType::ExternalName { .. }) {
        svc.spec.cluster_ip = None;
        return Ok(());
    }
    match svc.spec.cluster_ip.clone() {
        Some(ip) => {
            let addr: Ipv4Addr = ip
                .parse()
                .map_err(|_| ApiError::Invalid(format!("invalid cluster IP {:?}", ip)))?;
            let [a, b] = SERVICE_CIDR_PREFIX;
            if addr.octets()[..2] != [a, b] {
                return Err(ApiError::Invalid(format!(
                    "cluster IP {} is outside the service range {}.{}.0.0/16",
                    ip, a, b
                )));
            }
            if cluster_ips_in_use(ctx).contains(&ip) {
                return Err(ApiError::Invalid(format!(
                    "cluster IP {} is already allocated",
                    ip
                )));
            }
            Ok(())
        }
        None => {
            svc.spec.cluster_ip = Some(allocate_cluster_ip(ctx, &svc.metadata.name)?);
            Ok(())
        }
    }
}

/// Give every port of a NodePort/LoadBalancer service a node port, keeping
/// valid caller-supplied ones. Other types drop their node ports.
fn assign_node_ports(ctx: &Context<'_>, svc: &mut Service, own: &HashSet<u16>) -> Result<()> {
    if !svc.spec.service_type.uses_node_ports() {
        for port in &mut svc.spec.ports {
            port.node_port = None;
        }
        return Ok(());
    }

    let (lo, hi) = NODE_PORT_RANGE;
    let mut used: HashSet<u16> = node_ports_in_use(ctx).difference(own).copied().collect();
    for port in &mut svc.spec.ports {
        if let Some(requested) = port.node_port {
            if !(lo..=hi).contains(&requested) {
                return Err(ApiError::Invalid(format!(
                    "nodePort {} is outside the range {}-{}",
                    requested, lo, hi
                )));
            }
            if !used.insert(requested) {
                return Err(ApiError::Invalid(format!(
                    "nodePort {} is already allocated",
                    requested
                )));
            }
        }
    }
    for port in svc.spec.ports.iter_mut().filter(|p| p.node_port.is_none()) {
        let n = (lo..=hi)
            .find(|n| !used.contains(n))
            .ok_or_else(|| ApiError::Invalid("node port range exhausted".to_string()))?;
        used.insert(n);
        port.node_port = Some(n);
    }
    Ok(())
}

/// Admit a Service: allocate its addresses synchronously and queue load
/// balancer provisioning for `LoadBalancer` services.
pub fn create(ctx: &mut Context<'_>, mut svc: Service) -> Result<Service> {
    assign_cluster_ip(ctx, &mut svc)?;
    assign_node_ports(ctx, &mut svc, &HashSet::new())?;
    svc.metadata.stamp(ctx.faults.uid(), ctx.now);
    svc.status = ServiceStatus::default();
    ctx.objects.insert(svc.clone().into());

    info!(
        "Service {}/{}: type {} cluster IP {}",
        svc.metadata.namespace,
        svc.metadata.name,
        svc.spec.service_type,
        svc.spec.cluster_ip.as_deref().unwrap_or("None")
    );
    if svc.spec.service_type == ServiceType::LoadBalancer {
        schedule_provisioning(ctx, &svc);
    }
    Ok(svc)
}

fn schedule_provisioning(ctx: &mut Context<'_>, svc: &Service) {
    let delay = ctx.config.load_balancer_delay();
    ctx.schedule(
        delay,
        Task::ProvisionLoadBalancer {
            namespace: svc.metadata.namespace.clone(),
            name: svc.metadata.name.clone(),
            uid: svc.metadata.uid.clone(),
        },
    );
}

/// Assign an external ingress address, or record the failure and retry after
/// the same delay.
pub fn provision_load_balancer(ctx: &mut Context<'_>, namespace: &str, name: &str, uid: &str) {
    let Some(svc) = ctx.objects.services(Some(namespace)).find(|s| s.metadata.name == name).cloned() else {
        return;
    };
    if svc.metadata.uid != uid
        || svc.spec.service_type != ServiceType::LoadBalancer
        || !svc.status.load_balancer.ingress.is_empty()
    {
        return;
    }

    let [a, b, c] = LOAD_BALANCER_SUBNET_PREFIX;
    let used: HashSet<String> = ctx
        .objects
        .services(None)
        .flat_map(|s| s.status.load_balancer.ingress.iter().filter_map(|i| i.ip.clone()))
        .collect();
    let free_ip = (2..=254u8)
        .map(|d| format!("{}.{}.{}.{}", a, b, c, d))
        .find(|ip| !used.contains(ip));

    let ip = match free_ip {
        Some(ip) if ctx.faults.provision_succeeds() => ip,
        free_ip => {
            let cause = if free_ip.is_some() {
                ctx.metrics.counter_inc(names::SIMULATED_FAILURES);
                "simulated cloud provider failure"
            } else {
                "no free ingress address"
            };
            warn!("Service {}/{}: load balancer provisioning failed ({})", namespace, name, cause);
            ctx.record(
                EventType::Warning,
                "SyncLoadBalancerFailed",
                format!("Error syncing load balancer: {}", cause),
                ResourceKind::Service,
                &svc.metadata,
            );
            schedule_provisioning(ctx, &svc);
            return;
        }
    };

    let Some(stored) = ctx.objects.service_mut(namespace, name) else {
        return;
    };
    stored.status.load_balancer.ingress = vec![LoadBalancerIngress {
        ip: Some(ip.clone()),
        hostname: None,
    }];
    info!("Service {}/{}: load balancer ready at {}", namespace, name, ip);
    ctx.record(
        EventType::Normal,
        "EnsuredLoadBalancer",
        format!("Ensured load balancer {}", ip),
        ResourceKind::Service,
        &svc.metadata,
    );
}

/// Merge an update into the stored Service. The cluster IP cannot change;
/// node ports are kept or allocated to match the new type.
pub fn apply_update(ctx: &mut Context<'_>, stored: &Service, mut incoming: Service) -> Result<Service> {
    let was_external = matches!(stored.spec.service_type, ServiceType::ExternalName { .. });
    let is_external = matches!(incoming.spec.service_type, ServiceType::ExternalName { .. });
    if was_external != is_external {
        return Err(ApiError::Invalid(format!(
            "service {} cannot change between ExternalName and other types",
            stored.metadata.name
        )));
    }
    match (&incoming.spec.cluster_ip, &stored.spec.cluster_ip) {
        (Some(new), Some(old)) if new != old => {
            return Err(ApiError::Invalid(format!(
                "spec.clusterIP of service {} is immutable",
                stored.metadata.name
            )));
        }
        _ => incoming.spec.cluster_ip = stored.spec.cluster_ip.clone(),
    }

    // Ports the service already holds may be kept
    let own: HashSet<u16> = stored.spec.ports.iter().filter_map(|p| p.node_port).collect();
    for port in &mut incoming.spec.ports {
        if port.node_port.is_none()
            && let Some(previous) = stored.spec.ports.iter().find(|p| p.port == port.port)
        {
            port.node_port = previous.node_port;
        }
    }
    assign_node_ports(ctx, &mut incoming, &own)?;

    let mut merged = stored.clone();
    merged.metadata.labels = incoming.metadata.labels;
    merged.metadata.annotations = incoming.metadata.annotations;
    merged.spec = incoming.spec;
    if merged.spec.service_type != ServiceType::LoadBalancer {
        merged.status.load_balancer.ingress.clear();
    } else if stored.spec.service_type != ServiceType::LoadBalancer {
        schedule_provisioning(ctx, &merged);
    }
    Ok(merged)
}
