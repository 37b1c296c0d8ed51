use serde::{Deserialize, Serialize};

/// Resource quota for a namespace: pod count, CPU and memory limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuota {
    pub namespace: String,
    pub hard: QuotaLimits,
    #[serde(default)]
    pub used: QuotaUsage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimits {
    /// Maximum number of pods allowed
    #[serde(default)]
    pub max_pods: Option<u32>,
    /// Maximum total CPU in millicores
    #[serde(default)]
    pub max_cpu_millis: Option<u64>,
    /// Maximum total memory in bytes
    #[serde(default)]
    pub max_memory_bytes: Option<u64>,
}

impl QuotaLimits {
    pub fn pods(max_pods: u32) -> Self {
        Self {
            max_pods: Some(max_pods),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub pods: u32,
    pub cpu_millis: u64,
    pub memory_bytes: u64,
}
