//! Bootstrap asset handler

use atvboot_core::EntryPointUrl;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use tracing::info;

use crate::handlers::ApiError;
use crate::server::AppState;

/// Path the device fetches its bootstrap script from.
pub const ASSET_PATH: &str = "/appletv/js/application.js";

const JAVASCRIPT_CONTENT_TYPE: &str = "text/javascript";

/// `GET /appletv/js/application.js`
///
/// Resolves the interception state fresh on every request and serves the
/// template with the matching entry point. No caching headers.
///
/// # Errors
///
/// - `ApiError::Resolution` - The intercepted domain could not be resolved
pub async fn bootstrap_asset(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let interception = state.resolver.resolve().await?;
    let entry_point = EntryPointUrl::for_state(interception, &state.config.intercept);

    info!(state = %interception, entry_point = %entry_point, "Serving bootstrap asset");

    Ok((
        [(header::CONTENT_TYPE, JAVASCRIPT_CONTENT_TYPE)],
        state.asset.render(&entry_point),
    ))
}
