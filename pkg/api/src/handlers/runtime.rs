use axum::{
    Json,
    extract::{Path as AxumPath, State},
};
use pkg_types::container::Container;
use pkg_types::{ApiError, ResourceKind};
use tracing::info;

use crate::AppState;
use crate::error::HttpResult;

/// POST /api/v1/namespaces/{ns}/containers/{name}/{action}
///
/// `action` is one of start, stop, restart, pause, unpause or kill. Only
/// containers have actions.
pub async fn container_action(
    State(state): State<AppState>,
    AxumPath((ns, plural, name, action)): AxumPath<(String, String, String, String)>,
) -> HttpResult<Json<Container>> {
    if plural != ResourceKind::Container.plural() {
        return Err(ApiError::Invalid(format!("{} have no actions", plural)).into());
    }
    let engine = &state.engine;
    let container = match action.as_str() {
        "start" => engine.start_container(&ns, &name).await?,
        "stop" => engine.stop_container(&ns, &name).await?,
        "restart" => engine.restart_container(&ns, &name).await?,
        "pause" => engine.pause_container(&ns, &name).await?,
        "unpause" => engine.unpause_container(&ns, &name).await?,
        "kill" => engine.kill_container(&ns, &name).await?,
        other => {
            return Err(ApiError::Invalid(format!("unknown container action '{}'", other)).into());
        }
    };
    info!(
        "API: {} container {}/{} -> {}",
        action, ns, name, container.state.status
    );
    Ok(Json(container))
}
