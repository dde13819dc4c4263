//! Environment detection by name resolution of the intercepted domain.
//!
//! The resolver answers one question: does the intercepted domain currently
//! resolve to loopback? It performs a fresh lookup on every call so DNS
//! overrides can be toggled while the server is running.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::InterceptConfig;
use crate::interception::InterceptionState;

/// Errors from resolving the intercepted domain.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The system resolver failed outright.
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The answer contained no IPv4 address to compare against loopback.
    #[error("{host} did not resolve to an IPv4 address")]
    NoIpv4Address { host: String },
}

/// Name lookup seam so resolution can be substituted in tests.
#[async_trait]
pub trait HostLookup: Send + Sync {
    /// Returns every address the host currently resolves to.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - The underlying resolver failed
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Lookup through the operating system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Determines the current [`InterceptionState`].
#[derive(Clone)]
pub struct EnvironmentResolver {
    host: String,
    loopback: Ipv4Addr,
    lookup: Arc<dyn HostLookup>,
}

impl EnvironmentResolver {
    /// Creates a resolver for the intercepted host in `config`.
    pub fn new(config: &InterceptConfig, lookup: Arc<dyn HostLookup>) -> Self {
        Self {
            host: config.intercepted_host.clone(),
            loopback: config.loopback,
            lookup,
        }
    }

    /// Creates a resolver backed by the system resolver.
    pub fn system(config: &InterceptConfig) -> Self {
        Self::new(config, Arc::new(SystemLookup))
    }

    /// Hostname this resolver checks.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolves the intercepted host and classifies the first IPv4 answer.
    ///
    /// # Errors
    ///
    /// - `ResolutionError::Lookup` - Name resolution failed
    /// - `ResolutionError::NoIpv4Address` - Only IPv6 (or no) addresses returned
    pub async fn resolve(&self) -> Result<InterceptionState, ResolutionError> {
        let addrs = self.lookup.lookup(&self.host).await.map_err(|source| {
            warn!(host = %self.host, error = %source, "Name resolution failed");
            ResolutionError::Lookup {
                host: self.host.clone(),
                source,
            }
        })?;

        let resolved = addrs
            .into_iter()
            .find_map(|addr| match addr {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| ResolutionError::NoIpv4Address {
                host: self.host.clone(),
            })?;

        let state = InterceptionState::from_resolved(resolved, self.loopback);
        debug!(host = %self.host, resolved = %resolved, state = %state, "Resolved interception state");
        Ok(state)
    }
}

impl std::fmt::Debug for EnvironmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentResolver")
            .field("host", &self.host)
            .field("loopback", &self.loopback)
            .finish_non_exhaustive()
    }
}

/// In-memory lookup table whose answers can be changed at runtime.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct StaticLookup {
    answers: parking_lot::RwLock<std::collections::HashMap<String, Vec<IpAddr>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticLookup::set`].
    pub fn with(self, host: &str, addr: IpAddr) -> Self {
        self.set(host, vec![addr]);
        self
    }

    /// Replaces the answer for `host`.
    pub fn set(&self, host: &str, addrs: Vec<IpAddr>) {
        self.answers.write().insert(host.to_string(), addrs);
    }

    /// Makes lookups for `host` fail.
    pub fn remove(&self, host: &str) {
        self.answers.write().remove(host);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl HostLookup for StaticLookup {
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        self.answers.read().get(host).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no answer for {host}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use proptest::prelude::*;

    use super::*;

    fn resolver_with(lookup: Arc<StaticLookup>) -> EnvironmentResolver {
        EnvironmentResolver::new(&InterceptConfig::default(), lookup)
    }

    #[tokio::test]
    async fn test_loopback_answer_is_intercepted() {
        let lookup = Arc::new(StaticLookup::new().with("kortv.com", Ipv4Addr::LOCALHOST.into()));
        let state = resolver_with(lookup).resolve().await.unwrap();
        assert_eq!(state, InterceptionState::Intercepted);
    }

    #[tokio::test]
    async fn test_upstream_answer_is_production() {
        let lookup =
            Arc::new(StaticLookup::new().with("kortv.com", Ipv4Addr::new(104, 21, 3, 7).into()));
        let state = resolver_with(lookup).resolve().await.unwrap();
        assert_eq!(state, InterceptionState::Production);
    }

    #[tokio::test]
    async fn test_state_follows_dns_changes_without_restart() {
        let lookup = Arc::new(StaticLookup::new().with("kortv.com", Ipv4Addr::LOCALHOST.into()));
        let resolver = resolver_with(lookup.clone());
        assert!(resolver.resolve().await.unwrap().is_intercepted());

        lookup.set("kortv.com", vec![Ipv4Addr::new(8, 8, 4, 4).into()]);
        assert!(resolver.resolve().await.unwrap().is_production());
    }

    #[tokio::test]
    async fn test_ipv6_entries_are_skipped() {
        let lookup = Arc::new(StaticLookup::new());
        lookup.set(
            "kortv.com",
            vec![Ipv6Addr::LOCALHOST.into(), Ipv4Addr::LOCALHOST.into()],
        );
        assert!(resolver_with(lookup).resolve().await.unwrap().is_intercepted());
    }

    #[tokio::test]
    async fn test_ipv6_only_answer_is_an_error() {
        let lookup = Arc::new(StaticLookup::new().with("kortv.com", Ipv6Addr::LOCALHOST.into()));
        let err = resolver_with(lookup).resolve().await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoIpv4Address { .. }));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_an_error() {
        let err = resolver_with(Arc::new(StaticLookup::new()))
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Lookup { .. }));
        assert!(err.to_string().contains("kortv.com"));
    }

    proptest! {
        #[test]
        fn prop_resolve_intercepted_iff_loopback(octets in any::<[u8; 4]>()) {
            let addr = Ipv4Addr::from(octets);
            let lookup = Arc::new(StaticLookup::new().with("kortv.com", addr.into()));
            let state = tokio_test::block_on(resolver_with(lookup).resolve()).unwrap();
            prop_assert_eq!(state.is_intercepted(), addr == Ipv4Addr::LOCALHOST);
        }
    }
}
