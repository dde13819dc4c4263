//! atvboot Core - Interception and playback decision logic
//!
//! This crate holds everything the bootstrap server decides on its own:
//! whether the intercepted domain currently points at this host, how the
//! bootstrap script gets rewritten, what the wrapping playlist looks like,
//! and whether a playback request goes to the receiver directly or through
//! that playlist. Listener and HTTP plumbing live in `atvboot-web`.

pub mod airplay;
pub mod asset;
pub mod config;
pub mod dispatcher;
pub mod interception;
pub mod playlist;
pub mod resolver;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use airplay::{AirPlayError, AirPlayReceiver, HttpAirPlayReceiver};
pub use asset::{BootstrapAsset, EntryPointUrl};
pub use config::{BootstrapConfig, ConfigError};
pub use dispatcher::{
    PlaybackDecision, PlaybackDispatcher, PlaybackRequest, RequestDecodeError, WrapPolicy,
};
pub use interception::InterceptionState;
pub use playlist::{PlaylistDocument, PlaylistSynthesizer};
pub use resolver::{EnvironmentResolver, HostLookup, ResolutionError, SystemLookup};

#[cfg(any(test, feature = "test-utils"))]
pub use airplay::RecordingReceiver;
#[cfg(any(test, feature = "test-utils"))]
pub use resolver::StaticLookup;

/// Errors that can bubble up from any atvboot core subsystem.
///
/// Per-request failures are normally handled closer to the router; this type
/// is what startup and the command line see.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Failed to load bootstrap template {path}: {source}")]
    TemplateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Returns a short message suitable for showing to an operator.
    pub fn user_message(&self) -> String {
        match self {
            BootstrapError::Configuration(e) => format!("Invalid configuration: {e}"),
            BootstrapError::Resolution(ResolutionError::Lookup { host, .. }) => {
                format!("Could not resolve {host}")
            }
            BootstrapError::Resolution(ResolutionError::NoIpv4Address { host }) => {
                format!("{host} has no IPv4 address")
            }
            BootstrapError::TemplateLoad { path, .. } => {
                format!("Bootstrap template {path} could not be read")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_names_host() {
        let err: BootstrapError = ResolutionError::NoIpv4Address {
            host: "kortv.com".to_string(),
        }
        .into();
        assert_eq!(err.user_message(), "kortv.com has no IPv4 address");
    }

    #[test]
    fn test_config_errors_convert() {
        let err: BootstrapError = ConfigError::PortConflict { port: 8080 }.into();
        assert!(err.user_message().starts_with("Invalid configuration:"));
        assert!(err.to_string().contains("8080"));
    }
}
