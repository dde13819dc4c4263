//! Centralized configuration for atvboot.
//!
//! Hostnames, ports, certificate paths and playback toggles are all defined
//! here and constructed once at startup, then shared by reference.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::dispatcher::WrapPolicy;

/// Central configuration for all atvboot components.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    pub intercept: InterceptConfig,
    pub server: ServerConfig,
    pub playback: PlaybackConfig,
    pub airplay: AirPlayConfig,
}

/// What application is being intercepted and where its real backend lives.
#[derive(Debug, Clone)]
pub struct InterceptConfig {
    /// Short application name, used to locate the TLS certificate pair
    pub app_name: String,
    /// Domain the device was redirected away from
    pub intercepted_host: String,
    /// Real upstream host serving the application entry point
    pub production_host: String,
    /// Path of the entry point on either host, without leading slash
    pub entry_path: String,
    /// Address that marks the intercepted domain as redirected here
    pub loopback: Ipv4Addr,
    /// Bootstrap script template read once at startup
    pub template_path: PathBuf,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            app_name: "kortv".to_string(),
            intercepted_host: "kortv.com".to_string(),
            production_host: "chichid-atv2.herokuapp.com".to_string(),
            entry_path: "assets/templates/index.xml".to_string(),
            loopback: Ipv4Addr::LOCALHOST,
            template_path: PathBuf::from("application.js"),
        }
    }
}

/// Listener configuration for the plaintext and TLS endpoints.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both listeners bind to
    pub bind_address: IpAddr,
    /// Plaintext HTTP port
    pub http_port: u16,
    /// TLS port
    pub tls_port: u16,
    /// Whether the TLS listener is started at all
    pub tls_enabled: bool,
    /// PEM certificate for the TLS listener (None = derived from app name)
    pub cert_path: Option<PathBuf>,
    /// PEM private key for the TLS listener (None = derived from app name)
    pub key_path: Option<PathBuf>,
    /// Upper bound on reading a request body
    pub body_read_timeout: Duration,
    /// Time given to in-flight requests on shutdown
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 8080,
            tls_port: 443,
            tls_enabled: true,
            cert_path: None,
            key_path: None,
            body_read_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Playback dispatch and playlist settings.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Decides direct vs. wrapped dispatch
    pub wrap_policy: WrapPolicy,
    /// Path suffixes treated as native live playlists
    pub stream_extensions: Vec<String>,
    /// Host the receiver uses to reach this server for wrapped playlists
    pub self_host: String,
    /// Append `#EXT-X-ENDLIST` to synthesized playlists
    pub end_list: bool,
    /// Add permissive CORS headers to the playback endpoint
    pub allow_cross_origin: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            wrap_policy: WrapPolicy::ByExtension,
            stream_extensions: vec![".m3u8".to_string()],
            self_host: "127.0.0.1".to_string(),
            end_list: false,
            allow_cross_origin: true,
        }
    }
}

/// Location of the AirPlay receiver.
#[derive(Debug, Clone)]
pub struct AirPlayConfig {
    /// Receiver host or address
    pub receiver_host: String,
    /// Receiver AirPlay port
    pub receiver_port: u16,
    /// Timeout for the outbound play request
    pub request_timeout: Duration,
}

impl Default for AirPlayConfig {
    fn default() -> Self {
        Self {
            receiver_host: "127.0.0.1".to_string(),
            receiver_port: 7000,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must not be zero")]
    ZeroPort { field: &'static str },

    #[error("HTTP and TLS listeners cannot share port {port}")]
    PortConflict { port: u16 },
}

impl BootstrapConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("ATVBOOT_INTERCEPTED_HOST") {
            config.intercept.intercepted_host = host;
        }

        if let Ok(host) = std::env::var("ATVBOOT_PRODUCTION_HOST") {
            config.intercept.production_host = host;
        }

        if let Ok(path) = std::env::var("ATVBOOT_TEMPLATE") {
            config.intercept.template_path = PathBuf::from(path);
        }

        if let Ok(port) = std::env::var("ATVBOOT_HTTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.http_port = port;
            }
        }

        if let Ok(port) = std::env::var("ATVBOOT_TLS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.tls_port = port;
            }
        }

        if let Ok(receiver) = std::env::var("ATVBOOT_RECEIVER") {
            config.airplay.receiver_host = receiver;
        }

        if let Ok(policy) = std::env::var("ATVBOOT_WRAP_POLICY") {
            if let Ok(policy) = policy.parse::<WrapPolicy>() {
                config.playback.wrap_policy = policy;
            }
        }

        if let Ok(host) = std::env::var("ATVBOOT_SELF_HOST") {
            config.playback.self_host = host;
        }

        if let Ok(end_list) = std::env::var("ATVBOOT_END_LIST") {
            config.playback.end_list = end_list.parse().unwrap_or(false);
        }

        config
    }

    /// Creates a configuration for tests: ephemeral ports, no TLS.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                http_port: 8080,
                tls_port: 8443,
                tls_enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Checks the configuration for values that cannot work at runtime.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Empty` - A required host or list is empty
    /// - `ConfigError::ZeroPort` - A listener or receiver port is zero
    /// - `ConfigError::PortConflict` - Both listeners are on the same port
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intercept.intercepted_host.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "intercept.intercepted_host",
            });
        }
        if self.intercept.production_host.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "intercept.production_host",
            });
        }
        if self.playback.self_host.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "playback.self_host",
            });
        }
        if self.playback.stream_extensions.is_empty() {
            return Err(ConfigError::Empty {
                field: "playback.stream_extensions",
            });
        }
        if self.server.http_port == 0 {
            return Err(ConfigError::ZeroPort {
                field: "server.http_port",
            });
        }
        if self.airplay.receiver_port == 0 {
            return Err(ConfigError::ZeroPort {
                field: "airplay.receiver_port",
            });
        }
        if self.server.tls_enabled {
            if self.server.tls_port == 0 {
                return Err(ConfigError::ZeroPort {
                    field: "server.tls_port",
                });
            }
            if self.server.tls_port == self.server.http_port {
                return Err(ConfigError::PortConflict {
                    port: self.server.http_port,
                });
            }
        }
        Ok(())
    }

    /// TLS certificate path, `certificates/<app>.pem` unless overridden.
    pub fn cert_path(&self) -> PathBuf {
        self.server.cert_path.clone().unwrap_or_else(|| {
            PathBuf::from("certificates").join(format!("{}.pem", self.intercept.app_name))
        })
    }

    /// TLS key path, `certificates/<app>.key` unless overridden.
    pub fn key_path(&self) -> PathBuf {
        self.server.key_path.clone().unwrap_or_else(|| {
            PathBuf::from("certificates").join(format!("{}.key", self.intercept.app_name))
        })
    }

    /// Base URL the receiver uses to fetch wrapped playlists from us.
    pub fn self_base_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.playback.self_host, self.server.http_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = BootstrapConfig::default();

        assert_eq!(config.intercept.intercepted_host, "kortv.com");
        assert_eq!(config.intercept.loopback, Ipv4Addr::LOCALHOST);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.tls_port, 443);
        assert_eq!(config.playback.wrap_policy, WrapPolicy::ByExtension);
        assert!(!config.playback.end_list);
        assert_eq!(config.airplay.receiver_port, 7000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_certificate_paths_follow_app_name() {
        let mut config = BootstrapConfig::default();
        assert_eq!(config.cert_path(), PathBuf::from("certificates/kortv.pem"));
        assert_eq!(config.key_path(), PathBuf::from("certificates/kortv.key"));

        config.server.key_path = Some(PathBuf::from("/etc/ssl/custom.key"));
        assert_eq!(config.key_path(), PathBuf::from("/etc/ssl/custom.key"));
    }

    #[test]
    fn test_self_base_url() {
        let mut config = BootstrapConfig::default();
        config.playback.self_host = "192.168.2.10".to_string();
        config.server.http_port = 9090;
        assert_eq!(config.self_base_url(), "http://192.168.2.10:9090");
    }

    #[test]
    fn test_validate_rejects_port_conflict() {
        let mut config = BootstrapConfig::default();
        config.server.tls_port = config.server.http_port;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PortConflict { port: 8080 })
        );

        // Irrelevant once TLS is off
        config.server.tls_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_values() {
        let mut config = BootstrapConfig::default();
        config.intercept.intercepted_host = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Empty { field: "intercept.intercepted_host" })
        ));

        let mut config = BootstrapConfig::default();
        config.playback.stream_extensions.clear();
        assert!(config.validate().is_err());

        let mut config = BootstrapConfig::default();
        config.server.http_port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPort { .. })));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("ATVBOOT_HTTP_PORT", "9000");
            std::env::set_var("ATVBOOT_TLS_PORT", "not-a-port");
            std::env::set_var("ATVBOOT_INTERCEPTED_HOST", "example.tv");
            std::env::set_var("ATVBOOT_WRAP_POLICY", "always");
            std::env::set_var("ATVBOOT_END_LIST", "true");
        }

        let config = BootstrapConfig::from_env();

        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.tls_port, 443);
        assert_eq!(config.intercept.intercepted_host, "example.tv");
        assert_eq!(config.playback.wrap_policy, WrapPolicy::Always);
        assert!(config.playback.end_list);

        // Cleanup
        unsafe {
            std::env::remove_var("ATVBOOT_HTTP_PORT");
            std::env::remove_var("ATVBOOT_TLS_PORT");
            std::env::remove_var("ATVBOOT_INTERCEPTED_HOST");
            std::env::remove_var("ATVBOOT_WRAP_POLICY");
            std::env::remove_var("ATVBOOT_END_LIST");
        }
    }
}
