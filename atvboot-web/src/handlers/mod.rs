//! HTTP request handlers organized by functionality

pub mod asset;
pub mod error;
pub mod fallback;
pub mod playback;
pub mod playlist;

// Re-export handler functions
pub use asset::{ASSET_PATH, bootstrap_asset};
pub use error::ApiError;
pub use fallback::unmatched;
pub use playback::{PLAY_PATH, PlayQuery, play_video};
pub use playlist::{WrapQuery, wrap_video};
