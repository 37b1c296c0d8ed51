use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pkg_types::ApiError;
use serde_json::json;
use tracing::warn;

/// An [`ApiError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) | ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            ApiError::Invalid(_) | ApiError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            ApiError::SimulatedFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn reason(&self) -> &'static str {
        match &self.0 {
            ApiError::NotFound(_) => "NotFound",
            ApiError::AlreadyExists(_) => "AlreadyExists",
            ApiError::Conflict { .. } => "Conflict",
            ApiError::QuotaExceeded { .. } => "QuotaExceeded",
            ApiError::Invalid(_) => "Invalid",
            ApiError::InvalidOperation(_) => "InvalidOperation",
            ApiError::SimulatedFailure { .. } => "SimulatedFailure",
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        let body = json!({
            "reason": self.reason(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type HttpResult<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::{ObjectKey, ResourceKind};

    #[test]
    fn statuses_follow_the_error_kind() {
        let key = ObjectKey::new(ResourceKind::Pod, "default", "p1");
        let cases = [
            (ApiError::NotFound(key.clone()), StatusCode::NOT_FOUND),
            (ApiError::AlreadyExists(key.clone()), StatusCode::CONFLICT),
            (
                ApiError::Conflict {
                    key,
                    expected: 1,
                    actual: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                ApiError::QuotaExceeded {
                    namespace: "default".into(),
                    resource: "pods",
                    used: 1,
                    limit: 1,
                },
                StatusCode::FORBIDDEN,
            ),
            (ApiError::Invalid("bad".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::InvalidOperation("running".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::SimulatedFailure {
                    reason: "ErrImagePull".into(),
                    message: "pull failed".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(HttpError(err).status(), status);
        }
    }
}
