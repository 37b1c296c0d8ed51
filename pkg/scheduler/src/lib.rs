pub mod clock;
pub mod queue;

pub use clock::Clock;
pub use queue::TaskQueue;

use pkg_constants::network::{NODE_SUBNET_PREFIX, POD_CIDR_PREFIX};
use pkg_constants::sim::{NODE_CPU_MILLIS, NODE_MEMORY_BYTES};
use pkg_types::pod::{Pod, ResourceRequirements};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::info;

/// Usable host octets in each `/24` of the pod range.
const POD_HOSTS_PER_OCTET: u32 = 253;
/// Addresses in `10.244.0.0/16` that can go to pods.
const POD_ADDRESS_COUNT: u32 = 256 * POD_HOSTS_PER_OCTET;

/// A node of the simulated pool. Nothing runs on it; it only hands out a
/// host address and tracks how much of its capacity is bound.
#[derive(Debug, Clone)]
pub struct SimNode {
    pub name: String,
    pub address: String,
    pub capacity: ResourceRequirements,
    pub allocated: ResourceRequirements,
    pub ready: bool,
}

impl SimNode {
    fn new(index: usize, capacity: ResourceRequirements) -> Self {
        let [a, b, c] = NODE_SUBNET_PREFIX;
        let third = usize::from(c) + index / POD_HOSTS_PER_OCTET as usize;
        let host = index % POD_HOSTS_PER_OCTET as usize + 2;
        Self {
            name: format!("sim-node-{}", index + 1),
            address: format!("{}.{}.{}.{}", a, b, third, host),
            capacity,
            allocated: ResourceRequirements::default(),
            ready: true,
        }
    }
}

/// Why a pod could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unschedulable {
    #[error("0/{nodes} nodes are available: no node is ready")]
    NoReadyNodes { nodes: usize },
    #[error("0/{nodes} nodes are available: insufficient cpu or memory")]
    InsufficientResources { nodes: usize },
    #[error("pod network 10.244.0.0/16 has no free address")]
    PodNetworkExhausted,
}

/// Where a pod landed.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub node_name: String,
    pub host_ip: String,
    pub pod_ip: String,
}

#[derive(Debug, Clone)]
struct Binding {
    node: usize,
    requests: ResourceRequirements,
    pod_address: u32,
}

/// Cluster-wide pod address pool over `10.244.0.0/16`. Hands out the next
/// free address after the last one given, so released addresses are reused
/// only after the pool wraps.
#[derive(Debug, Default)]
struct PodAddressPool {
    used: BTreeSet<u32>,
    next: u32,
}

impl PodAddressPool {
    fn allocate(&mut self) -> Option<u32> {
        if self.used.len() as u32 >= POD_ADDRESS_COUNT {
            return None;
        }
        let mut candidate = self.next;
        while self.used.contains(&candidate) {
            candidate = (candidate + 1) % POD_ADDRESS_COUNT;
        }
        self.used.insert(candidate);
        self.next = (candidate + 1) % POD_ADDRESS_COUNT;
        Some(candidate)
    }

    fn release(&mut self, address: u32) {
        self.used.remove(&address);
    }

    fn clear(&mut self) {
        self.used.clear();
        self.next = 0;
    }

    fn format(address: u32) -> String {
        let [a, b] = POD_CIDR_PREFIX;
        let third = address / POD_HOSTS_PER_OCTET;
        let host = address % POD_HOSTS_PER_OCTET + 2;
        format!("{}.{}.{}.{}", a, b, third, host)
    }
}

/// Round-robin placement over the simulated node pool with resource
/// availability filtering.
#[derive(Debug)]
pub struct Scheduler {
    nodes: Vec<SimNode>,
    /// Keyed by `namespace/name`.
    bindings: HashMap<String, Binding>,
    pod_addresses: PodAddressPool,
    round_robin_index: usize,
}

fn binding_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

impl Scheduler {
    pub fn new(node_count: usize) -> Self {
        Self::with_capacity(
            node_count,
            ResourceRequirements {
                cpu_millis: NODE_CPU_MILLIS,
                memory_bytes: NODE_MEMORY_BYTES,
            },
        )
    }

    pub fn with_capacity(node_count: usize, capacity: ResourceRequirements) -> Self {
        Self {
            nodes: (0..node_count.max(1))
                .map(|i| SimNode::new(i, capacity))
                .collect(),
            bindings: HashMap::new(),
            pod_addresses: PodAddressPool::default(),
            round_robin_index: 0,
        }
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Bind a pod to a node. Scheduling an already bound pod returns its
    /// existing placement.
    pub fn schedule(&mut self, pod: &Pod) -> Result<Placement, Unschedulable> {
        let key = binding_key(&pod.metadata.namespace, &pod.metadata.name);
        if let Some(binding) = self.bindings.get(&key) {
            return Ok(self.placement(binding));
        }

        let requests = pod.spec.requests();
        let eligible: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| is_node_eligible(n, requests))
            .map(|(i, _)| i)
            .collect();

        if eligible.is_empty() {
            info!(
                "No eligible nodes for pod {}/{}",
                pod.metadata.namespace, pod.metadata.name
            );
            let nodes = self.nodes.len();
            return Err(if self.nodes.iter().any(|n| n.ready) {
                Unschedulable::InsufficientResources { nodes }
            } else {
                Unschedulable::NoReadyNodes { nodes }
            });
        }

        let pod_address = self
            .pod_addresses
            .allocate()
            .ok_or(Unschedulable::PodNetworkExhausted)?;

        // Round-robin selection among eligible nodes
        let idx = eligible[self.round_robin_index % eligible.len()];
        self.round_robin_index = self.round_robin_index.wrapping_add(1);

        let node = &mut self.nodes[idx];
        node.allocated = node.allocated.saturating_add(requests);

        let binding = Binding {
            node: idx,
            requests,
            pod_address,
        };
        let placement = self.placement(&binding);
        info!(
            "Scheduled pod {}/{} → node {} ({})",
            pod.metadata.namespace, pod.metadata.name, placement.node_name, placement.pod_ip
        );
        self.bindings.insert(key, binding);
        Ok(placement)
    }

    /// Return a pod's resources and address.
    pub fn release(&mut self, namespace: &str, name: &str) -> bool {
        let Some(binding) = self.bindings.remove(&binding_key(namespace, name)) else {
            return false;
        };
        self.pod_addresses.release(binding.pod_address);
        if let Some(node) = self.nodes.get_mut(binding.node) {
            node.allocated = ResourceRequirements {
                cpu_millis: node.allocated.cpu_millis.saturating_sub(binding.requests.cpu_millis),
                memory_bytes: node
                    .allocated
                    .memory_bytes
                    .saturating_sub(binding.requests.memory_bytes),
            };
        }
        true
    }

    pub fn set_node_ready(&mut self, name: &str, ready: bool) -> bool {
        match self.nodes.iter_mut().find(|n| n.name == name) {
            Some(node) => {
                node.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Drop every binding and mark all nodes ready again.
    pub fn reset(&mut self) {
        self.bindings.clear();
        self.pod_addresses.clear();
        self.round_robin_index = 0;
        for node in &mut self.nodes {
            node.allocated = ResourceRequirements::default();
            node.ready = true;
        }
    }

    fn placement(&self, binding: &Binding) -> Placement {
        let node = &self.nodes[binding.node];
        Placement {
            node_name: node.name.clone(),
            host_ip: node.address.clone(),
            pod_ip: PodAddressPool::format(binding.pod_address),
        }
    }
}

/// Check if a node can take a pod with these requests.
fn is_node_eligible(node: &SimNode, requests: ResourceRequirements) -> bool {
    if !node.ready {
        return false;
    }

    if node.capacity.cpu_millis > 0 {
        let available_cpu = node
            .capacity
            .cpu_millis
            .saturating_sub(node.allocated.cpu_millis);
        if requests.cpu_millis > available_cpu {
            return false;
        }
    }
    if node.capacity.memory_bytes > 0 {
        let available_mem = node
            .capacity
            .memory_bytes
            .saturating_sub(node.allocated.memory_bytes);
        if requests.memory_bytes > available_mem {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::ObjectMeta;
    use pkg_types::pod::{ContainerSpec, PodSpec};

    fn make_pod(name: &str, cpu_millis: u64) -> Pod {
        let mut container = ContainerSpec::new("app", "nginx:latest");
        container.resources = ResourceRequirements {
            cpu_millis,
            memory_bytes: 128_000_000,
        };
        Pod::new(
            ObjectMeta::named("default", name),
            PodSpec {
                containers: vec![container],
                node_name: None,
            },
        )
    }

    #[test]
    fn test_schedule_round_robin() {
        let mut scheduler = Scheduler::new(2);
        let p1 = scheduler.schedule(&make_pod("a", 100)).unwrap();
        let p2 = scheduler.schedule(&make_pod("b", 100)).unwrap();

        assert_ne!(p1.node_name, p2.node_name); // Should alternate
        assert_eq!(p1.host_ip, "192.168.49.2");
        assert_eq!(p2.host_ip, "192.168.49.3");
        assert_eq!(p1.pod_ip, "10.244.0.2");
        assert_eq!(p2.pod_ip, "10.244.0.3");
    }

    #[test]
    fn test_schedule_is_idempotent_per_pod() {
        let mut scheduler = Scheduler::new(3);
        let pod = make_pod("a", 100);
        let first = scheduler.schedule(&pod).unwrap();
        let again = scheduler.schedule(&pod).unwrap();
        assert_eq!(first, again);
        assert_eq!(scheduler.nodes()[0].allocated.cpu_millis, 100);
    }

    #[test]
    fn test_skip_not_ready_nodes() {
        let mut scheduler = Scheduler::new(2);
        assert!(scheduler.set_node_ready("sim-node-1", false));
        for name in ["a", "b", "c"] {
            let placement = scheduler.schedule(&make_pod(name, 10)).unwrap();
            assert_eq!(placement.node_name, "sim-node-2");
        }
    }

    #[test]
    fn test_no_eligible_nodes() {
        let mut scheduler = Scheduler::with_capacity(
            2,
            ResourceRequirements {
                cpu_millis: 500,
                memory_bytes: 0,
            },
        );
        assert_eq!(
            scheduler.schedule(&make_pod("huge", 1000)),
            Err(Unschedulable::InsufficientResources { nodes: 2 })
        );
    }

    #[test]
    fn test_release_frees_capacity_and_address() {
        let mut scheduler = Scheduler::with_capacity(
            1,
            ResourceRequirements {
                cpu_millis: 1000,
                memory_bytes: 0,
            },
        );
        let first = scheduler.schedule(&make_pod("a", 1000)).unwrap();
        assert!(scheduler.schedule(&make_pod("b", 1000)).is_err());

        assert!(scheduler.release("default", "a"));
        assert!(!scheduler.release("default", "a"));
        let second = scheduler.schedule(&make_pod("b", 1000)).unwrap();
        assert_eq!(first.node_name, second.node_name);
        assert_ne!(first.pod_ip, second.pod_ip);
    }

    #[test]
    fn test_reset_clears_bindings() {
        let mut scheduler = Scheduler::new(1);
        scheduler.schedule(&make_pod("a", 300)).unwrap();
        scheduler.set_node_ready("sim-node-1", false);
        scheduler.reset();
        assert_eq!(scheduler.nodes()[0].allocated, ResourceRequirements::default());
        assert!(scheduler.nodes()[0].ready);
    }

    #[test]
    fn test_not_ready_pool_reports_reason() {
        let mut scheduler = Scheduler::new(1);
        scheduler.set_node_ready("sim-node-1", false);
        let err = scheduler.schedule(&make_pod("a", 10)).unwrap_err();
        assert_eq!(err, Unschedulable::NoReadyNodes { nodes: 1 });
        assert!(err.to_string().contains("no node is ready"));
    }

    #[test]
    fn test_many_pods_get_distinct_addresses() {
        let mut scheduler = Scheduler::new(3);
        let mut seen = BTreeSet::new();
        for i in 0..2000 {
            let pod = Pod::new(
                ObjectMeta::named("default", &format!("p{i}")),
                PodSpec {
                    containers: vec![ContainerSpec::new("app", "nginx:latest")],
                    node_name: None,
                },
            );
            let placement = scheduler.schedule(&pod).unwrap();
            assert!(seen.insert(placement.pod_ip));
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn test_pod_addresses_cover_the_whole_range() {
        assert_eq!(PodAddressPool::format(0), "10.244.0.2");
        assert_eq!(PodAddressPool::format(252), "10.244.0.254");
        assert_eq!(PodAddressPool::format(253), "10.244.1.2");
        assert_eq!(PodAddressPool::format(POD_ADDRESS_COUNT - 1), "10.244.255.254");
    }

    #[test]
    fn test_large_node_pool_has_unique_host_addresses() {
        let scheduler = Scheduler::new(300);
        let addresses: BTreeSet<&str> = scheduler.nodes().iter().map(|n| n.address.as_str()).collect();
        assert_eq!(addresses.len(), 300);
        assert_eq!(scheduler.nodes()[252].address, "192.168.49.254");
        assert_eq!(scheduler.nodes()[253].address, "192.168.50.2");
    }
}
