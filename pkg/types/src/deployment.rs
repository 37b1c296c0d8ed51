use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::meta::ObjectMeta;
use crate::pod::PodSpec;

// --- Pod template ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub spec: PodSpec,
}

// --- Deployment status ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub replicas: u32,
    pub ready_replicas: u32,
    pub available_replicas: u32,
    /// Last generation the reconciler acted on
    #[serde(default)]
    pub observed_generation: u64,
}

// --- Deployment spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub replicas: u32,
    /// Label selector for matching pods; defaults to the template labels
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    pub template: PodTemplate,
}

// --- Deployment ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(default = "deployment_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
    /// Monotonically increasing generation; bumped on spec changes
    #[serde(default)]
    pub generation: u64,
}

fn deployment_api_version() -> String {
    "apps/v1".to_string()
}

impl Deployment {
    pub fn new(metadata: ObjectMeta, spec: DeploymentSpec) -> Self {
        Self {
            api_version: deployment_api_version(),
            metadata,
            spec,
            status: DeploymentStatus::default(),
            generation: 0,
        }
    }

    /// True once every desired replica is observed running.
    pub fn is_settled(&self) -> bool {
        self.status.replicas == self.spec.replicas
            && self.status.ready_replicas == self.spec.replicas
            && self.status.observed_generation == self.generation
    }
}
