use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::meta::ObjectMeta;

// --- Resource requirements ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// CPU in millicores (1000 = 1 core)
    #[serde(default)]
    pub cpu_millis: u64,
    /// Memory in bytes
    #[serde(default)]
    pub memory_bytes: u64,
}

impl ResourceRequirements {
    pub fn saturating_add(self, other: ResourceRequirements) -> Self {
        Self {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
        }
    }
}

// --- Container spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    #[serde(default)]
    pub name: Option<String>,
    pub container_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

impl ContainerSpec {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            command: Vec::new(),
            env: BTreeMap::new(),
            resources: ResourceRequirements::default(),
            ports: Vec::new(),
        }
    }
}

// --- Pod spec ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<ContainerSpec>,
    /// The simulated node this pod is placed on (set by the scheduler)
    #[serde(default)]
    pub node_name: Option<String>,
}

impl PodSpec {
    /// Sum of the resource requests of every container.
    pub fn requests(&self) -> ResourceRequirements {
        self.containers
            .iter()
            .fold(ResourceRequirements::default(), |acc, c| {
                acc.saturating_add(c.resources)
            })
    }
}

// --- Pod phase ---

/// Observable pod phase. Data that only makes sense in one phase travels
/// with that variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PodPhase {
    #[default]
    Pending,
    Running {
        host_ip: String,
        pod_ip: String,
        started_at: DateTime<Utc>,
    },
    Succeeded,
    Failed {
        reason: String,
        message: String,
    },
    Unknown,
}

impl PodPhase {
    pub fn name(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running { .. } => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed { .. } => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PodPhase::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed { .. })
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- Pod status ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    #[serde(default)]
    pub last_termination_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub phase: PodPhase,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

impl PodStatus {
    /// Total restarts across every container of the pod.
    pub fn restart_count(&self) -> u32 {
        self.container_statuses.iter().map(|c| c.restart_count).sum()
    }
}

// --- Pod ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default = "pod_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

fn pod_api_version() -> String {
    "v1".to_string()
}

impl Pod {
    pub fn new(metadata: ObjectMeta, spec: PodSpec) -> Self {
        Self {
            api_version: pod_api_version(),
            metadata,
            spec,
            status: PodStatus::default(),
        }
    }
}
