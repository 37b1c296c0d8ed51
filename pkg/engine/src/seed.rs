use pkg_constants::network::KUBERNETES_SERVICE_IP;
use pkg_constants::runtime::{SEED_IMAGES, SYSTEM_PODS};
use pkg_constants::state::{DEFAULT_NAMESPACE, SYSTEM_NAMESPACE};
use pkg_container::seeded_image;
use pkg_controllers::{Context, pod};
use pkg_types::ObjectMeta;
use pkg_types::pod::{ContainerSpec, Pod, PodPhase, PodSpec};
use pkg_types::service::{Service, ServicePort, ServiceSpec, ServiceType};
use tracing::{info, warn};
use uuid::Uuid;

/// Uid derived from the object's identity, identical after every reset.
fn seeded_uid(kind: &str, namespace: &str, name: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("kubesim://{}/{}/{}", kind, namespace, name).as_bytes(),
    )
    .to_string()
}

/// Populate a fresh store: cached images, the `kube-system` pods and the
/// `kubernetes` service.
pub(crate) fn seed_defaults(ctx: &mut Context<'_>) {
    for (reference, size) in SEED_IMAGES {
        ctx.objects.insert(seeded_image(reference, *size, ctx.now).into());
    }

    for (name, image) in SYSTEM_PODS {
        let meta = ObjectMeta::named(SYSTEM_NAMESPACE, name)
            .with_label("tier", "system")
            .with_label("k8s-app", name);
        let mut pod = Pod::new(
            meta,
            PodSpec {
                containers: vec![ContainerSpec::new(name, image)],
                node_name: None,
            },
        );
        pod.metadata
            .stamp(seeded_uid("pods", SYSTEM_NAMESPACE, name), ctx.now);
        pod.status = pod::initial_status(&pod.spec);

        match ctx.scheduler.schedule(&pod) {
            Ok(placement) => {
                pod.spec.node_name = Some(placement.node_name);
                pod.status.phase = PodPhase::Running {
                    host_ip: placement.host_ip,
                    pod_ip: placement.pod_ip,
                    started_at: ctx.now,
                };
                for status in &mut pod.status.container_statuses {
                    status.ready = true;
                }
            }
            Err(e) => warn!("System pod {}/{} not placed: {}", SYSTEM_NAMESPACE, name, e),
        }
        ctx.objects.insert(pod.into());
    }

    let mut kubernetes = Service::new(
        ObjectMeta::named(DEFAULT_NAMESPACE, "kubernetes")
            .with_label("component", "apiserver")
            .with_label("provider", "kubernetes"),
        ServiceSpec {
            selector: Default::default(),
            ports: vec![ServicePort {
                name: "https".to_string(),
                port: 443,
                target_port: 6443,
                node_port: None,
            }],
            service_type: ServiceType::ClusterIP,
            cluster_ip: Some(KUBERNETES_SERVICE_IP.to_string()),
        },
    );
    kubernetes
        .metadata
        .stamp(seeded_uid("services", DEFAULT_NAMESPACE, "kubernetes"), ctx.now);
    ctx.objects.insert(kubernetes.into());

    info!(
        "Seeded {} images, {} system pods and the kubernetes service",
        SEED_IMAGES.len(),
        SYSTEM_PODS.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_uids_depend_only_on_identity() {
        assert_eq!(
            seeded_uid("pods", "kube-system", "coredns"),
            seeded_uid("pods", "kube-system", "coredns")
        );
        assert_ne!(
            seeded_uid("pods", "kube-system", "coredns"),
            seeded_uid("pods", "kube-system", "kube-proxy")
        );
    }
}
