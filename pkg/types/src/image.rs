use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// A locally cached image. `metadata.name` is the normalized reference
/// (`repository:tag`) the image was pulled under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default = "image_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    /// Content digest (`sha256:...`)
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

fn image_api_version() -> String {
    "engine/v1".to_string()
}

impl Image {
    pub fn new(reference: &str) -> Self {
        let reference = normalize_reference(reference);
        Self {
            api_version: image_api_version(),
            metadata: ObjectMeta::named("", &reference),
            id: String::new(),
            repo_tags: vec![reference],
            size: 0,
            created: None,
        }
    }

    pub fn has_tag(&self, reference: &str) -> bool {
        let reference = normalize_reference(reference);
        self.repo_tags.iter().any(|t| *t == reference)
    }
}

/// Append `:latest` to references that carry neither a tag nor a digest.
pub fn normalize_reference(reference: &str) -> String {
    let reference = reference.trim();
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    if last_segment.contains(':') || last_segment.contains('@') {
        reference.to_string()
    } else {
        format!("{}:latest", reference)
    }
}

/// Render a byte count the way `docker images` does.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1}GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.0}kB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}
