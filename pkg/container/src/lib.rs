pub mod image;
pub mod runtime;

pub use image::seeded_image;
pub use runtime::{ContainerRuntime, list_containers};
