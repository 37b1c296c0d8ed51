//! Engine-level containers: a single runtime unit, modeled after the
//! Docker engine API rather than the pod abstraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::meta::ObjectMeta;

/// Container lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPhase {
    /// Container has been created but not yet started.
    #[default]
    Created,
    /// Container is actively running.
    Running,
    /// Processes are frozen.
    Paused,
    /// Between a stop and the next start attempt.
    Restarting,
    /// Container stopped; see the exit code.
    Exited,
    /// Container can no longer be started.
    Dead,
}

impl ContainerPhase {
    /// States in which removal requires `force`.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ContainerPhase::Running | ContainerPhase::Paused | ContainerPhase::Restarting
        )
    }
}

impl fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerPhase::Created => write!(f, "created"),
            ContainerPhase::Running => write!(f, "running"),
            ContainerPhase::Paused => write!(f, "paused"),
            ContainerPhase::Restarting => write!(f, "restarting"),
            ContainerPhase::Exited => write!(f, "exited"),
            ContainerPhase::Dead => write!(f, "dead"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    pub container_port: u16,
    #[serde(default)]
    pub host_port: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub image: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    /// Memory limit in bytes
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
    /// CPU limit in millicores
    #[serde(default)]
    pub cpu_limit_millis: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub status: ContainerPhase,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Error recorded by the last failed start.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub restart_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(default = "container_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub config: ContainerConfig,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub network_settings: NetworkSettings,
    /// Digest of the image the container was created from
    #[serde(default)]
    pub image_id: String,
}

fn container_api_version() -> String {
    "engine/v1".to_string()
}

impl Container {
    pub fn new(metadata: ObjectMeta, config: ContainerConfig) -> Self {
        Self {
            api_version: container_api_version(),
            metadata,
            config,
            state: ContainerState::default(),
            network_settings: NetworkSettings::default(),
            image_id: String::new(),
        }
    }
}
