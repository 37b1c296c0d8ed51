use axum::{
    Json,
    extract::{Path as AxumPath, State},
};
use pkg_types::ApiError;
use pkg_types::fault::FaultProfile;
use tracing::info;

use crate::AppState;
use crate::error::HttpResult;

/// GET /api/v1/faults
pub async fn get_faults(State(state): State<AppState>) -> Json<FaultProfile> {
    Json(state.engine.fault_profile())
}

/// PUT /api/v1/faults
pub async fn put_faults(
    State(state): State<AppState>,
    Json(profile): Json<FaultProfile>,
) -> Json<FaultProfile> {
    state.engine.set_fault_profile(profile);
    Json(state.engine.fault_profile())
}

/// POST /api/v1/faults/{preset}
pub async fn apply_preset(
    State(state): State<AppState>,
    AxumPath(preset): AxumPath<String>,
) -> HttpResult<Json<FaultProfile>> {
    let engine = &state.engine;
    let profile = match preset.as_str() {
        "network-partition" | "network-failure" => engine.simulate_network_partition(),
        "resource-exhaustion" | "resource-contention" => engine.simulate_resource_exhaustion(),
        "restore" => engine.restore_normal_operation(),
        other => {
            return Err(ApiError::Invalid(format!("unknown fault preset '{}'", other)).into());
        }
    };
    info!("API: fault preset {} applied", preset);
    Ok(Json(profile))
}
