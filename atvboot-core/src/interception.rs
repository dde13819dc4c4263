//! Interception state of the bootstrapped application's domain.

use std::net::Ipv4Addr;

/// Whether the intercepted domain currently points at this host.
///
/// Derived from a fresh name lookup every time the bootstrap asset is
/// requested. Never cached: operators flip DNS overrides at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptionState {
    /// The domain resolves to its real upstream.
    Production,
    /// The domain resolves to loopback, i.e. it has been redirected here.
    Intercepted,
}

impl InterceptionState {
    /// Classifies a resolved address against the loopback address.
    pub fn from_resolved(resolved: Ipv4Addr, loopback: Ipv4Addr) -> Self {
        if resolved == loopback {
            Self::Intercepted
        } else {
            Self::Production
        }
    }

    /// Check if the domain is redirected to this host.
    pub fn is_intercepted(self) -> bool {
        matches!(self, Self::Intercepted)
    }

    /// Check if the domain resolves to its real upstream.
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for InterceptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "PRODUCTION"),
            Self::Intercepted => write!(f, "INTERCEPTED"),
        }
    }
}

impl std::str::FromStr for InterceptionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "intercepted" => Ok(Self::Intercepted),
            _ => Err(format!(
                "Invalid interception state: '{s}'. Valid options are: production, intercepted"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_loopback_is_intercepted() {
        let state = InterceptionState::from_resolved(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        assert!(state.is_intercepted());
        assert_eq!(state.to_string(), "INTERCEPTED");
    }

    #[test]
    fn test_parse_round_trips_display() {
        for state in [InterceptionState::Production, InterceptionState::Intercepted] {
            let parsed: InterceptionState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("staging".parse::<InterceptionState>().is_err());
    }

    proptest! {
        #[test]
        fn prop_only_loopback_is_intercepted(octets in any::<[u8; 4]>()) {
            let resolved = Ipv4Addr::from(octets);
            let state = InterceptionState::from_resolved(resolved, Ipv4Addr::LOCALHOST);
            prop_assert_eq!(state.is_intercepted(), resolved == Ipv4Addr::LOCALHOST);
        }
    }
}
