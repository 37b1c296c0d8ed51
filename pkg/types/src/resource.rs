use serde::{Deserialize, Serialize};

use crate::container::Container;
use crate::deployment::Deployment;
use crate::image::Image;
use crate::meta::{ObjectKey, ObjectMeta, ResourceKind};
use crate::pod::Pod;
use crate::service::Service;

/// Any object the store can hold, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Resource {
    Pod(Pod),
    Deployment(Deployment),
    Service(Service),
    Container(Container),
    Image(Image),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Pod(_) => ResourceKind::Pod,
            Resource::Deployment(_) => ResourceKind::Deployment,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Container(_) => ResourceKind::Container,
            Resource::Image(_) => ResourceKind::Image,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Pod(o) => &o.metadata,
            Resource::Deployment(o) => &o.metadata,
            Resource::Service(o) => &o.metadata,
            Resource::Container(o) => &o.metadata,
            Resource::Image(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Pod(o) => &mut o.metadata,
            Resource::Deployment(o) => &mut o.metadata,
            Resource::Service(o) => &mut o.metadata,
            Resource::Container(o) => &mut o.metadata,
            Resource::Image(o) => &mut o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(self.kind(), &meta.namespace, &meta.name)
    }

    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            Resource::Pod(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_pod_mut(&mut self) -> Option<&mut Pod> {
        match self {
            Resource::Pod(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            Resource::Deployment(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_deployment_mut(&mut self) -> Option<&mut Deployment> {
        match self {
            Resource::Deployment(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Service> {
        match self {
            Resource::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_service_mut(&mut self) -> Option<&mut Service> {
        match self {
            Resource::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Resource::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Resource::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Resource::Image(i) => Some(i),
            _ => None,
        }
    }
}

impl From<Pod> for Resource {
    fn from(p: Pod) -> Self {
        Resource::Pod(p)
    }
}

impl From<Deployment> for Resource {
    fn from(d: Deployment) -> Self {
        Resource::Deployment(d)
    }
}

impl From<Service> for Resource {
    fn from(s: Service) -> Self {
        Resource::Service(s)
    }
}

impl From<Container> for Resource {
    fn from(c: Container) -> Self {
        Resource::Container(c)
    }
}

impl From<Image> for Resource {
    fn from(i: Image) -> Self {
        Resource::Image(i)
    }
}
