//! Playback dispatch handler

use atvboot_core::PlaybackRequest;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use crate::handlers::ApiError;
use crate::server::AppState;

/// Path devices post playback requests to.
pub const PLAY_PATH: &str = "/play";

/// Optional query string of `/play`.
#[derive(Debug, Default, Deserialize)]
pub struct PlayQuery {
    /// Explicit wrap request, honoured under the on-request policy
    pub wrap: Option<String>,
}

impl PlayQuery {
    fn wrap_requested(&self) -> bool {
        self.wrap
            .as_deref()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

/// `POST /play` with `{"videoUrl": "..."}`
///
/// The body is decoded regardless of content type. An undecodable query
/// string counts as no wrap request. Dispatch is fire-and-forget: a `200`
/// only means the receiver was asked to play.
///
/// # Errors
///
/// - `ApiError::Body` - Body could not be read (including timeout)
/// - `ApiError::Decode` - Malformed JSON or missing `videoUrl`
pub async fn play_video(
    State(state): State<AppState>,
    query: Result<Query<PlayQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body.map_err(|e| ApiError::Body(e.body_text()))?;
    let request = PlaybackRequest::from_json(&body)?;

    let wrap_requested = match query {
        Ok(Query(query)) => query.wrap_requested(),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Ignoring undecodable play query");
            false
        }
    };
    state.dispatcher.play(&request.video_url, wrap_requested);

    Ok(format!("Playing {}", request.video_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_requested_values() {
        let query = |v: &str| PlayQuery {
            wrap: Some(v.to_string()),
        };
        assert!(query("true").wrap_requested());
        assert!(query("1").wrap_requested());
        assert!(query("YES").wrap_requested());
        assert!(!query("false").wrap_requested());
        assert!(!PlayQuery::default().wrap_requested());
    }
}
