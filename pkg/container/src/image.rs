use chrono::{DateTime, Utc};
use pkg_constants::runtime::PULLED_IMAGE_SIZE_RANGE;
use pkg_metrics::names;
use pkg_types::event::{EventType, ObjectReference};
use pkg_types::image::{Image, format_size, normalize_reference};
use pkg_types::validate::validate_image_reference;
use pkg_types::{ApiError, ObjectKey, Resource, ResourceKind, Result};
use tracing::{info, warn};
use uuid::Uuid;

use crate::runtime::ContainerRuntime;

/// A cached image with a digest and uid derived from its reference, so
/// reseeding always yields identical objects.
pub fn seeded_image(reference: &str, size: u64, now: DateTime<Utc>) -> Image {
    let mut image = Image::new(reference);
    let reference = normalize_reference(reference);
    let layer = Uuid::new_v5(&Uuid::NAMESPACE_OID, reference.as_bytes());
    let config = Uuid::new_v5(&layer, b"config");
    image.id = format!("sha256:{}{}", layer.simple(), config.simple());
    image.size = size;
    image.created = Some(now);
    image
        .metadata
        .stamp(Uuid::new_v5(&Uuid::NAMESPACE_URL, reference.as_bytes()).to_string(), now);
    image
}

fn image_ref(reference: &str) -> ObjectReference {
    ObjectReference {
        kind: ResourceKind::Image,
        namespace: String::new(),
        name: normalize_reference(reference),
        uid: String::new(),
    }
}

impl ContainerRuntime<'_> {
    // ─── Image Operations ───────────────────────────────────────────

    /// Return the cached image, or pull it (sampling the pull success rate).
    pub fn pull_image(&mut self, reference: &str) -> Result<Image> {
        validate_image_reference(reference)?;
        if let Some(image) = self.objects.find_image(reference) {
            info!("Image {} already cached", reference);
            return Ok(image.clone());
        }

        info!("Pulling image: {}", reference);
        if !self.faults.pull_succeeds() {
            let message = format!(
                "Failed to pull image \"{}\": simulated registry failure",
                normalize_reference(reference)
            );
            warn!("{}", message);
            self.metrics.counter_inc(names::SIMULATED_FAILURES);
            self.record(EventType::Warning, "Failed", message.clone(), image_ref(reference));
            return Err(ApiError::SimulatedFailure {
                reason: "ErrImagePull".to_string(),
                message,
            });
        }

        let (min, max) = PULLED_IMAGE_SIZE_RANGE;
        let mut image = Image::new(reference);
        image.id = format!("sha256:{}", self.faults.hex(32));
        image.size = self.faults.range_u64(min, max);
        image.created = Some(self.now);
        image.metadata.stamp(self.faults.uid(), self.now);

        self.objects.insert(image.clone().into());
        self.record(
            EventType::Normal,
            "Pulled",
            format!(
                "Successfully pulled image \"{}\" ({})",
                image.metadata.name,
                format_size(image.size)
            ),
            ObjectReference::from_meta(ResourceKind::Image, &image.metadata),
        );
        Ok(image)
    }

    /// Names of the containers created from `image`.
    pub fn image_users(&self, image: &Image) -> Vec<String> {
        self.objects
            .containers(None)
            .filter(|c| c.image_id == image.id)
            .map(|c| format!("{}/{}", c.metadata.namespace, c.metadata.name))
            .collect()
    }

    /// Remove a cached image by tag or id. Images used by any container need
    /// `force`; those containers can no longer start afterwards.
    pub fn remove_image(&mut self, reference: &str, force: bool) -> Result<Image> {
        let image = self
            .objects
            .find_image(reference)
            .cloned()
            .ok_or_else(|| {
                ApiError::NotFound(ObjectKey::new(
                    ResourceKind::Image,
                    "",
                    &normalize_reference(reference),
                ))
            })?;

        let users = self.image_users(&image);
        if !users.is_empty() && !force {
            return Err(ApiError::InvalidOperation(format!(
                "image {} is being used by container {}",
                image.metadata.name,
                users.join(", ")
            )));
        }

        let key = ObjectKey::new(ResourceKind::Image, "", &image.metadata.name);
        match self.objects.remove(&key) {
            Some(Resource::Image(removed)) => {
                info!("Image {} removed ({} users)", removed.metadata.name, users.len());
                Ok(removed)
            }
            _ => Err(ApiError::NotFound(key)),
        }
    }
}
