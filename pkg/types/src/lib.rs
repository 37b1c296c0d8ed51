//! Resource model shared by every kubesim crate.

pub mod config;
pub mod container;
pub mod deployment;
pub mod error;
pub mod event;
pub mod fault;
pub mod image;
pub mod meta;
pub mod pod;
pub mod quota;
pub mod resource;
pub mod selector;
pub mod service;
pub mod stats;
pub mod validate;

pub use error::{ApiError, Result};
pub use meta::{ObjectKey, ObjectMeta, OwnerReference, ResourceKind};
pub use resource::Resource;
