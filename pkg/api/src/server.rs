use axum::{
    Router, middleware,
    routing::{get, post},
};
use pkg_engine::ControlPlane;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::AppState;
use crate::handlers::{cluster, faults, resources, runtime, watch};
use crate::request_id::request_id_middleware;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
}

/// All routes over one engine.
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/usage", get(cluster::resource_usage))
        .route("/api/v1/events", get(cluster::list_events))
        .route("/api/v1/watch", get(watch::watch_events))
        .route("/api/v1/cleanup", post(cluster::cleanup))
        // Fault injection
        .route(
            "/api/v1/faults",
            get(faults::get_faults).put(faults::put_faults),
        )
        .route("/api/v1/faults/{preset}", post(faults::apply_preset))
        // Quotas
        .route(
            "/api/v1/namespaces/{ns}/quota",
            get(cluster::get_quota).put(cluster::put_quota),
        )
        // Objects of every kind
        .route(
            "/api/v1/namespaces/{ns}/{kind}",
            post(resources::create_resource).get(resources::list_resources),
        )
        .route(
            "/api/v1/namespaces/{ns}/{kind}/{name}",
            get(resources::get_resource)
                .put(resources::update_resource)
                .delete(resources::delete_resource),
        )
        .route(
            "/api/v1/namespaces/{ns}/{kind}/{name}/{action}",
            post(runtime::container_action),
        );

    Router::new()
        .route("/healthz", get(cluster::healthz))
        .route("/metrics", get(cluster::metrics))
        .merge(api_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

pub async fn start_server(config: ServerConfig, engine: Arc<ControlPlane>) -> anyhow::Result<()> {
    let app = router(AppState::new(engine));

    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_id::REQUEST_ID_HEADER;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use pkg_types::config::SimConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        let engine = Arc::new(ControlPlane::simulated(SimConfig::deterministic(21)));
        router(AppState::new(engine))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn pod_body(name: &str) -> Value {
        json!({
            "metadata": { "name": name, "labels": { "app": name } },
            "spec": { "containers": [{ "name": "app", "image": "nginx:latest" }] }
        })
    }

    #[tokio::test]
    async fn healthz_carries_a_request_id() {
        let response = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn pod_crud_over_http() {
        let app = app();
        let (status, created) =
            call(&app, Method::POST, "/api/v1/namespaces/ns1/pods", Some(pod_body("web"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["kind"], "Pod");
        assert_eq!(created["metadata"]["namespace"], "ns1");
        assert_eq!(created["metadata"]["resourceVersion"], 1);

        let (status, _) =
            call(&app, Method::POST, "/api/v1/namespaces/ns1/pods", Some(pod_body("web"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut changed = created.clone();
        changed["metadata"]["annotations"] = json!({ "note": "edited" });
        let (status, updated) =
            call(&app, Method::PUT, "/api/v1/namespaces/ns1/pods/web", Some(changed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["metadata"]["resourceVersion"], 2);

        let (status, _) =
            call(&app, Method::PUT, "/api/v1/namespaces/ns1/pods/web", Some(created)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, Method::DELETE, "/api/v1/namespaces/ns1/pods/web", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::GET, "/api/v1/namespaces/ns1/pods/web", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "NotFound");
    }

    #[tokio::test]
    async fn list_filters_by_label_selector() {
        let app = app();
        for name in ["web", "api"] {
            call(&app, Method::POST, "/api/v1/namespaces/ns1/pods", Some(pod_body(name))).await;
        }
        let (status, pods) = call(
            &app,
            Method::GET,
            "/api/v1/namespaces/ns1/pods?labelSelector=app%3Dapi",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let pods = pods.as_array().unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0]["metadata"]["name"], "api");
    }

    #[tokio::test]
    async fn quota_rejections_are_forbidden() {
        let app = app();
        let (status, quota) = call(
            &app,
            Method::PUT,
            "/api/v1/namespaces/ns1/quota",
            Some(json!({ "maxPods": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quota["hard"]["maxPods"], 1);

        call(&app, Method::POST, "/api/v1/namespaces/ns1/pods", Some(pod_body("p1"))).await;
        let (status, body) =
            call(&app, Method::POST, "/api/v1/namespaces/ns1/pods", Some(pod_body("p2"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["reason"], "QuotaExceeded");

        let (_, quota) = call(&app, Method::GET, "/api/v1/namespaces/ns1/quota", None).await;
        assert_eq!(quota["used"]["pods"], 1);
    }

    #[tokio::test]
    async fn container_actions() {
        let app = app();
        let body = json!({ "metadata": { "name": "cache" }, "config": { "image": "redis:7" } });
        let (status, created) =
            call(&app, Method::POST, "/api/v1/namespaces/default/containers", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"]["status"], "running");

        let (status, stopped) = call(
            &app,
            Method::POST,
            "/api/v1/namespaces/default/containers/cache/stop",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stopped["state"]["status"], "exited");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/namespaces/default/containers/cache/explode",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/namespaces/default/pods/cache/start",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fault_presets_and_cleanup() {
        let app = app();
        let (status, profile) = call(&app, Method::POST, "/api/v1/faults/resource-exhaustion", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, current) = call(&app, Method::GET, "/api/v1/faults", None).await;
        assert_eq!(profile, current);

        let (status, _) = call(&app, Method::POST, "/api/v1/faults/meteor-strike", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, "/api/v1/cleanup", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, usage) = call(&app, Method::GET, "/api/v1/usage", None).await;
        assert_eq!(usage["pods"]["total"], 3);
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let (status, body) = call(&app(), Method::GET, "/api/v1/namespaces/ns1/secrets", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "Invalid");
    }
}
