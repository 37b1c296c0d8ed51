use pkg_constants::sim;
use serde::{Deserialize, Serialize};

/// Probabilities and latencies every simulated operation consults.
///
/// Rates are probabilities in `0.0..=1.0`; values outside that range are
/// clamped when sampled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FaultProfile {
    /// Latency awaited by every API call
    pub network_latency_ms: u64,
    pub pod_start_success_rate: f64,
    pub pull_success_rate: f64,
    pub container_start_success_rate: f64,
    /// LoadBalancer ingress provisioning
    pub provision_success_rate: f64,
    /// Per-tick probability that a running pod crashes
    pub crash_rate: f64,
}

impl FaultProfile {
    /// Every operation succeeds immediately; nothing crashes.
    pub fn reliable() -> Self {
        Self {
            network_latency_ms: 0,
            pod_start_success_rate: 1.0,
            pull_success_rate: 1.0,
            container_start_success_rate: 1.0,
            provision_success_rate: 1.0,
            crash_rate: 0.0,
        }
    }

    /// Network partition: slow calls, most pulls and provisioning fail.
    pub fn network_partition() -> Self {
        Self {
            network_latency_ms: sim::PARTITION_LATENCY_MS,
            pod_start_success_rate: 0.1,
            pull_success_rate: 0.05,
            container_start_success_rate: 0.5,
            provision_success_rate: 0.0,
            crash_rate: sim::NORMAL_CRASH_RATE,
        }
    }

    /// Resource exhaustion: starts fail often and running pods crash.
    pub fn resource_exhaustion() -> Self {
        Self {
            network_latency_ms: sim::EXHAUSTION_LATENCY_MS,
            pod_start_success_rate: 0.3,
            pull_success_rate: 0.9,
            container_start_success_rate: 0.3,
            provision_success_rate: 0.8,
            crash_rate: 0.2,
        }
    }
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            network_latency_ms: sim::NORMAL_LATENCY_MS,
            pod_start_success_rate: 0.95,
            pull_success_rate: 0.98,
            container_start_success_rate: 0.95,
            provision_success_rate: 1.0,
            crash_rate: sim::NORMAL_CRASH_RATE,
        }
    }
}
