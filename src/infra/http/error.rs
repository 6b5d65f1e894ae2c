use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inkshop_api_types::ErrorBody;

use crate::application::error::ErrorReport;
use crate::cache::CacheError;

/// JSON error response: `{"error": "..."}` plus an attached [`ErrorReport`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(source: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            report: ErrorReport::from_message(source, status, message.clone()),
            message,
        }
    }

    /// Public `message` in the body, private `detail` in the report only.
    pub fn with_detail(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn not_found(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a cache error, keeping its full chain in the report but only a
    /// public message in the body.
    pub fn from_cache(source: &'static str, error: CacheError) -> Self {
        let (status, message) = match &error {
            CacheError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            CacheError::InvalidArgument { message } => (StatusCode::BAD_REQUEST, message.clone()),
            CacheError::UpstreamFetchFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load catalog data".to_string(),
            ),
        };
        Self {
            status,
            message,
            report: ErrorReport::from_error(source, status, &error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(ErrorBody::new(self.message))).into_response();
        self.report.attach(&mut response);
        response
    }
}
