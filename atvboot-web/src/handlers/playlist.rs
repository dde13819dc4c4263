//! Playlist wrapping handler

use atvboot_core::playlist::PLAYLIST_CONTENT_TYPE;
use axum::extract::{Query, State};
use axum::http::{Uri, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crate::handlers::ApiError;
use crate::server::AppState;

/// Query string of `/wrapVideo`.
#[derive(Debug, Deserialize)]
pub struct WrapQuery {
    /// Media URL to wrap, already percent-decoded
    pub url: Option<String>,
}

/// `GET /wrapVideo?url=<media>`
///
/// # Errors
///
/// - `ApiError::MissingParameter` - No `url` in the query string
/// - `ApiError::InvalidQuery` - Query string not decodable
pub async fn wrap_video(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
    render_playlist(&state, &uri)
}

/// Shared by the `/wrapVideo` route and any other GET path containing it.
pub(crate) fn render_playlist(state: &AppState, uri: &Uri) -> Result<Response, ApiError> {
    let Query(query) = Query::<WrapQuery>::try_from_uri(uri)
        .map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let media_url = query
        .url
        .filter(|url| !url.is_empty())
        .ok_or(ApiError::MissingParameter("url"))?;

    info!(url = %media_url, "Wrapping media in playlist");

    Ok((
        [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
        state.playlist.wrap(&media_url).into_string(),
    )
        .into_response())
}
