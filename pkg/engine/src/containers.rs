use pkg_container::list_containers;
use pkg_controllers::Task;
use pkg_types::container::Container;
use pkg_types::image::Image;
use pkg_types::{ApiError, Resource, ResourceKind, Result};

use crate::ControlPlane;

/// Docker-style operations on engine containers and the image cache.
impl ControlPlane {
    pub async fn start_container(&self, namespace: &str, name: &str) -> Result<Container> {
        self.faults.delay().await;
        self.with_context(|ctx| ctx.runtime().start(namespace, name))
    }

    pub async fn stop_container(&self, namespace: &str, name: &str) -> Result<Container> {
        self.faults.delay().await;
        self.with_context(|ctx| ctx.runtime().stop(namespace, name))
    }

    /// Stop the container now and start it again after the configured
    /// restart delay.
    pub async fn restart_container(&self, namespace: &str, name: &str) -> Result<Container> {
        self.faults.delay().await;
        self.with_context(|ctx| {
            let container = ctx.runtime().restart(namespace, name)?;
            let delay = ctx.config.container_restart_delay();
            ctx.schedule(
                delay,
                Task::RestartContainer {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    uid: container.metadata.uid.clone(),
                },
            );
            Ok(container)
        })
    }

    pub async fn pause_container(&self, namespace: &str, name: &str) -> Result<Container> {
        self.faults.delay().await;
        self.with_context(|ctx| ctx.runtime().pause(namespace, name))
    }

    pub async fn unpause_container(&self, namespace: &str, name: &str) -> Result<Container> {
        self.faults.delay().await;
        self.with_context(|ctx| ctx.runtime().unpause(namespace, name))
    }

    pub async fn kill_container(&self, namespace: &str, name: &str) -> Result<Container> {
        self.faults.delay().await;
        self.with_context(|ctx| ctx.runtime().kill(namespace, name))
    }

    /// Same as deleting the container object.
    pub async fn remove_container(&self, namespace: &str, name: &str, force: bool) -> Result<Container> {
        match self
            .delete(ResourceKind::Container, namespace, name, force)
            .await?
        {
            Resource::Container(c) => Ok(c),
            other => Err(ApiError::NotFound(other.key())),
        }
    }

    /// Return the cached image or pull it.
    pub async fn pull_image(&self, reference: &str) -> Result<Image> {
        self.faults.delay().await;
        self.with_context(|ctx| ctx.runtime().pull_image(reference))
    }

    /// Same as deleting the image object.
    pub async fn remove_image(&self, reference: &str, force: bool) -> Result<Image> {
        match self
            .delete(ResourceKind::Image, "", reference, force)
            .await?
        {
            Resource::Image(i) => Ok(i),
            other => Err(ApiError::NotFound(other.key())),
        }
    }

    pub async fn list_images(&self) -> Vec<Image> {
        self.faults.delay().await;
        self.store.read().images().cloned().collect()
    }

    /// Containers in `namespace` (or all namespaces). Without `all`, only
    /// containers that are up.
    pub async fn list_containers(&self, namespace: Option<&str>, all: bool) -> Vec<Container> {
        self.faults.delay().await;
        list_containers(&self.store.read(), namespace, all)
    }
}
