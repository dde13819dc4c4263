//! Conversion of per-request failures into HTTP responses

use atvboot_core::{RequestDecodeError, ResolutionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

/// Every way a single request can fail.
///
/// None of these escape the handler; each becomes a plain-text response.
#[derive(Debug, Error)]
pub enum ApiError {
    /// GET on a path nothing serves.
    #[error("Resource {path} not found")]
    NotFound {
        /// Requested path including any query string
        path: String,
    },

    /// Non-GET request on a path nothing serves.
    #[error("Not Supported")]
    NotSupported,

    /// Required query parameter absent.
    #[error("Missing required query parameter `{0}`")]
    MissingParameter(&'static str),

    /// Query string present but not decodable.
    #[error("Invalid query string: {0}")]
    InvalidQuery(String),

    /// Playback body could not be decoded.
    #[error("Invalid playback request: {0}")]
    Decode(#[from] RequestDecodeError),

    /// Playback body could not be read.
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// Intercepted domain could not be resolved.
    #[error("Cannot determine environment: {0}")]
    Resolution(#[from] ResolutionError),
}

impl ApiError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::NotSupported => StatusCode::NOT_IMPLEMENTED,
            ApiError::MissingParameter(_)
            | ApiError::InvalidQuery(_)
            | ApiError::Decode(_)
            | ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::Resolution(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::NotFound {
                path: "/x".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::NotSupported.status_code(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            ApiError::MissingParameter("url").status_code(),
            StatusCode::BAD_REQUEST
        );
        let resolution = ResolutionError::NoIpv4Address {
            host: "kortv.com".to_string(),
        };
        assert_eq!(
            ApiError::from(resolution).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_not_found_names_path() {
        let err = ApiError::NotFound {
            path: "/missing?x=1".to_string(),
        };
        assert_eq!(err.to_string(), "Resource /missing?x=1 not found");
    }
}
