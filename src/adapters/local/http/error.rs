use crate::application::delivery::DeliveryError;
use crate::application::ingest::IngestError;
use crate::ports::catalog::CatalogError;
use axum::extract::multipart::MultipartError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Seconds a client should wait before asking again for a rendition that
/// is still processing.
const RETRY_AFTER_SECS: &str = "10";

fn detail(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status = match &self {
            DeliveryError::Unauthorized => StatusCode::UNAUTHORIZED,
            DeliveryError::NotFound | DeliveryError::UnsupportedResolution(_) => {
                StatusCode::NOT_FOUND
            }
            DeliveryError::NotReady(_) => StatusCode::CONFLICT,
            DeliveryError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            DeliveryError::Internal(e) => {
                tracing::error!(error = %e, "delivery failed");
                return detail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.".to_string(),
                );
            }
        };

        let mut response = detail(status, self.to_string());
        let headers = response.headers_mut();
        match self {
            DeliveryError::Unauthorized => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            DeliveryError::NotReady(_) => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            }
            DeliveryError::RangeNotSatisfiable { len } => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", len)) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }
        response
    }
}

/// Error of the operator routes.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Not found.".to_string(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "operator request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error.".to_string(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnknownVideo(_) => ApiError::not_found(),
            IngestError::Video(e) => ApiError::bad_request(e.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::internal(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        detail(self.status, self.message)
    }
}
