use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags each request with an id, runs the handler inside a span carrying
/// it and echoes the id back in the `x-request-id` response header.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let span = tracing::info_span!(
        "api_request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
