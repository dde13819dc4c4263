//! Handling for requests no route claims

use atvboot_core::dispatcher::WRAP_PATH;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::Response;

use crate::handlers::ApiError;
use crate::handlers::playlist::render_playlist;
use crate::server::AppState;

/// Catch-all for unmatched paths and methods.
///
/// Any GET/HEAD whose path contains the wrap marker is still served a
/// playlist. Other GET/HEAD requests are `404` naming the path; everything else is
/// `501`.
///
/// # Errors
///
/// - `ApiError::NotFound` - GET/HEAD on an unknown path
/// - `ApiError::NotSupported` - Any other method
pub async fn unmatched(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    let readable = method == Method::GET || method == Method::HEAD;
    if readable && uri.path().contains(WRAP_PATH) {
        return render_playlist(&state, &uri);
    }

    if readable {
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        return Err(ApiError::NotFound {
            path: path.to_string(),
        });
    }

    Err(ApiError::NotSupported)
}
