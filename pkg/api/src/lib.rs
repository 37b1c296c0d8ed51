//! Optional local HTTP surface over a [`ControlPlane`].

pub mod error;
pub mod handlers;
pub mod request_id;
pub mod server;

use std::sync::Arc;

use pkg_engine::ControlPlane;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ControlPlane>,
}

impl AppState {
    pub fn new(engine: Arc<ControlPlane>) -> Self {
        Self { engine }
    }
}
