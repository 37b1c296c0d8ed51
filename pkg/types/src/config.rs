use pkg_constants::{sim, state};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fault::FaultProfile;
use crate::quota::QuotaLimits;

/// Simulator configuration, injected into every engine instance.
///
/// Example `config.yaml` section:
/// ```yaml
/// sim:
///   seed: 42
///   tick-interval-ms: 5000
///   pod-start-delay-min-ms: 500
///   pod-start-delay-max-ms: 2000
///   faults:
///     podStartSuccessRate: 0.9
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every random decision; `None` seeds from the OS.
    pub seed: Option<u64>,
    #[serde(alias = "tick-interval-ms")]
    pub tick_interval_ms: u64,
    #[serde(alias = "pod-start-delay-min-ms")]
    pub pod_start_delay_min_ms: u64,
    #[serde(alias = "pod-start-delay-max-ms")]
    pub pod_start_delay_max_ms: u64,
    #[serde(alias = "deployment-settle-delay-ms")]
    pub deployment_settle_delay_ms: u64,
    #[serde(alias = "load-balancer-delay-ms")]
    pub load_balancer_delay_ms: u64,
    #[serde(alias = "container-restart-delay-ms")]
    pub container_restart_delay_ms: u64,
    #[serde(alias = "event-retention-secs")]
    pub event_retention_secs: u64,
    #[serde(alias = "baseline-load")]
    pub baseline_load: f64,
    #[serde(alias = "node-count")]
    pub node_count: usize,
    pub faults: FaultProfile,
    /// Applied to namespaces without an explicit quota.
    #[serde(alias = "default-quota")]
    pub default_quota: Option<QuotaLimits>,
    /// Seed system pods, the `kubernetes` service and cached images.
    #[serde(alias = "seed-defaults")]
    pub seed_defaults: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_interval_ms: sim::DEFAULT_TICK_INTERVAL_MS,
            pod_start_delay_min_ms: sim::DEFAULT_POD_START_DELAY_MIN_MS,
            pod_start_delay_max_ms: sim::DEFAULT_POD_START_DELAY_MAX_MS,
            deployment_settle_delay_ms: sim::DEFAULT_DEPLOYMENT_SETTLE_DELAY_MS,
            load_balancer_delay_ms: sim::DEFAULT_LOAD_BALANCER_DELAY_MS,
            container_restart_delay_ms: sim::DEFAULT_CONTAINER_RESTART_DELAY_MS,
            event_retention_secs: state::DEFAULT_EVENT_RETENTION_SECS,
            baseline_load: sim::DEFAULT_BASELINE_LOAD,
            node_count: sim::DEFAULT_NODE_COUNT,
            faults: FaultProfile::default(),
            default_quota: None,
            seed_defaults: true,
        }
    }
}

impl SimConfig {
    /// Seeded, fault-free configuration for tests.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            faults: FaultProfile::reliable(),
            ..Default::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Inclusive bounds of the pod start delay, normalized so `min <= max`.
    pub fn pod_start_delay_bounds(&self) -> (Duration, Duration) {
        let min = self.pod_start_delay_min_ms.min(self.pod_start_delay_max_ms);
        let max = self.pod_start_delay_min_ms.max(self.pod_start_delay_max_ms);
        (Duration::from_millis(min), Duration::from_millis(max))
    }

    pub fn deployment_settle_delay(&self) -> Duration {
        Duration::from_millis(self.deployment_settle_delay_ms)
    }

    pub fn load_balancer_delay(&self) -> Duration {
        Duration::from_millis(self.load_balancer_delay_ms)
    }

    pub fn container_restart_delay(&self) -> Duration {
        Duration::from_millis(self.container_restart_delay_ms)
    }

    pub fn event_retention(&self) -> Duration {
        Duration::from_secs(self.event_retention_secs)
    }
}

/// Server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 6443
/// sim:
///   seed: 7
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub sim: Option<SimConfig>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
