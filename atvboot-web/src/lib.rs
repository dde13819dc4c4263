//! atvboot Web - Request router and listeners

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Maps device requests onto the core operations: bootstrap asset rewriting,
//! playlist wrapping and playback dispatch. Serves the same router on a
//! plaintext and a TLS listener.

pub mod handlers;
pub mod server;

// Re-export main types
pub use handlers::ApiError;
pub use server::{AppState, BootstrapServer, BoundServer, ServerError, build_router};
