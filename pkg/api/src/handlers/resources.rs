use axum::{
    Json,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use pkg_types::{ApiError, Resource, ResourceKind};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::AppState;
use crate::error::HttpResult;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub label_selector: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

fn parse_kind(plural: &str) -> Result<ResourceKind, ApiError> {
    ResourceKind::from_plural(plural)
        .ok_or_else(|| ApiError::Invalid(format!("unknown resource type '{}'", plural)))
}

/// Decode a request body into a [`Resource`] of `kind`. The `kind` tag comes
/// from the URL and the namespace from the path, overriding the body.
fn resource_from_body(kind: ResourceKind, namespace: &str, body: Value) -> Result<Resource, ApiError> {
    let Value::Object(mut fields) = body else {
        return Err(ApiError::Invalid("request body must be a JSON object".to_string()));
    };
    fields.insert("kind".to_string(), Value::String(kind.to_string()));
    let mut resource: Resource = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::Invalid(format!("malformed {}: {}", kind, e)))?;
    if kind.is_namespaced() {
        resource.metadata_mut().namespace = namespace.to_string();
    }
    Ok(resource)
}

/// POST /api/v1/namespaces/{ns}/{kind}
pub async fn create_resource(
    State(state): State<AppState>,
    AxumPath((ns, plural)): AxumPath<(String, String)>,
    Json(body): Json<Value>,
) -> HttpResult<impl IntoResponse> {
    let kind = parse_kind(&plural)?;
    let resource = resource_from_body(kind, &ns, body)?;
    let created = state.engine.create(resource).await?;
    info!("API: created {}", created.key());
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/namespaces/{ns}/{kind}
pub async fn list_resources(
    State(state): State<AppState>,
    AxumPath((ns, plural)): AxumPath<(String, String)>,
    Query(query): Query<ListQuery>,
) -> HttpResult<Json<Vec<Resource>>> {
    let kind = parse_kind(&plural)?;
    let items = state
        .engine
        .list(kind, Some(&ns), query.label_selector.as_deref())
        .await?;
    Ok(Json(items))
}

/// GET /api/v1/namespaces/{ns}/{kind}/{name}
pub async fn get_resource(
    State(state): State<AppState>,
    AxumPath((ns, plural, name)): AxumPath<(String, String, String)>,
) -> HttpResult<Json<Resource>> {
    let kind = parse_kind(&plural)?;
    Ok(Json(state.engine.get(kind, &ns, &name).await?))
}

/// PUT /api/v1/namespaces/{ns}/{kind}/{name}
pub async fn update_resource(
    State(state): State<AppState>,
    AxumPath((ns, plural, name)): AxumPath<(String, String, String)>,
    Json(body): Json<Value>,
) -> HttpResult<Json<Resource>> {
    let kind = parse_kind(&plural)?;
    let mut resource = resource_from_body(kind, &ns, body)?;
    let meta = resource.metadata_mut();
    if meta.name.is_empty() {
        meta.name = name;
    } else if meta.name != name {
        return Err(ApiError::Invalid(format!(
            "body names '{}' but the path names '{}'",
            meta.name, name
        ))
        .into());
    }
    let updated = state.engine.update(resource).await?;
    info!("API: updated {}", updated.key());
    Ok(Json(updated))
}

/// DELETE /api/v1/namespaces/{ns}/{kind}/{name}
pub async fn delete_resource(
    State(state): State<AppState>,
    AxumPath((ns, plural, name)): AxumPath<(String, String, String)>,
    Query(query): Query<DeleteQuery>,
) -> HttpResult<Json<Resource>> {
    let kind = parse_kind(&plural)?;
    let removed = state.engine.delete(kind, &ns, &name, query.force).await?;
    info!("API: deleted {}", removed.key());
    Ok(Json(removed))
}
