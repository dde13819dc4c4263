//! Bootstrap script rewriting.
//!
//! The device fetches a JavaScript bootstrap on startup to find its
//! application entry point. We serve the configured script with only that
//! entry point swapped.

use std::path::Path;

use tracing::{info, warn};

use crate::config::InterceptConfig;
use crate::interception::InterceptionState;
use crate::BootstrapError;

/// Token in the bootstrap template replaced by the entry-point URL.
pub const ENTRY_POINT_PLACEHOLDER: &str = "{{config.MainTemplate}}";

/// `https://{host}/{path}` entry point injected into the bootstrap script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointUrl(String);

impl EntryPointUrl {
    /// Picks the host for `state` and formats the entry point.
    ///
    /// Production targets the real upstream; intercepted targets the
    /// intercepted hostname so the device comes back through this server.
    pub fn for_state(state: InterceptionState, config: &InterceptConfig) -> Self {
        let host = match state {
            InterceptionState::Production => &config.production_host,
            InterceptionState::Intercepted => &config.intercepted_host,
        };
        Self(format!(
            "https://{host}/{}",
            config.entry_path.trim_start_matches('/')
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryPointUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable bootstrap template, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BootstrapAsset {
    template: String,
}

impl BootstrapAsset {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Reads the template from disk.
    ///
    /// # Errors
    ///
    /// - `BootstrapError::TemplateLoad` - File missing or unreadable
    pub fn load(path: &Path) -> crate::Result<Self> {
        let template =
            std::fs::read_to_string(path).map_err(|source| BootstrapError::TemplateLoad {
                path: path.display().to_string(),
                source,
            })?;

        let asset = Self::new(template);
        if asset.has_placeholder() {
            info!(path = %path.display(), bytes = asset.template.len(), "Loaded bootstrap template");
        } else {
            warn!(
                path = %path.display(),
                placeholder = ENTRY_POINT_PLACEHOLDER,
                "Bootstrap template has no entry-point placeholder; it will be served unchanged"
            );
        }
        Ok(asset)
    }

    /// Whether the template contains the entry-point placeholder.
    pub fn has_placeholder(&self) -> bool {
        self.template.contains(ENTRY_POINT_PLACEHOLDER)
    }

    /// Substitutes the first placeholder occurrence with `entry_point`.
    ///
    /// A template without the placeholder is returned unchanged.
    pub fn render(&self, entry_point: &EntryPointUrl) -> String {
        self.template
            .replacen(ENTRY_POINT_PLACEHOLDER, entry_point.as_str(), 1)
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use proptest::prelude::*;

    use super::*;

    const TEMPLATE: &str = "atv.onAppEntry = function () { atv.loadURL('{{config.MainTemplate}}'); }";

    #[test]
    fn test_entry_point_per_state() {
        let config = InterceptConfig::default();

        let prod = EntryPointUrl::for_state(InterceptionState::Production, &config);
        assert_eq!(
            prod.as_str(),
            "https://chichid-atv2.herokuapp.com/assets/templates/index.xml"
        );

        let intercepted = EntryPointUrl::for_state(InterceptionState::Intercepted, &config);
        assert_eq!(
            intercepted.as_str(),
            "https://kortv.com/assets/templates/index.xml"
        );
    }

    #[test]
    fn test_render_substitutes_entry_point() {
        let asset = BootstrapAsset::new(TEMPLATE);
        let entry = EntryPointUrl::for_state(
            InterceptionState::Intercepted,
            &InterceptConfig::default(),
        );

        let rendered = asset.render(&entry);
        assert_eq!(
            rendered,
            "atv.onAppEntry = function () { atv.loadURL('https://kortv.com/assets/templates/index.xml'); }"
        );
        // Template itself is untouched
        assert_eq!(asset.template(), TEMPLATE);
    }

    #[test]
    fn test_render_without_placeholder_is_identity() {
        let asset = BootstrapAsset::new("var baseURL;\nfunction loadPage(url) {}\n");
        assert!(!asset.has_placeholder());
        let entry = EntryPointUrl("https://example.com/x".to_string());
        assert_eq!(asset.render(&entry), asset.template());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEMPLATE.as_bytes()).unwrap();

        let asset = BootstrapAsset::load(file.path()).unwrap();
        assert!(asset.has_placeholder());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BootstrapAsset::load(&dir.path().join("application.js")).unwrap_err();
        assert!(matches!(err, BootstrapError::TemplateLoad { .. }));
    }

    proptest! {
        #[test]
        fn prop_template_without_placeholder_unchanged(
            template in "[^{}]*",
            url in ".*",
        ) {
            let asset = BootstrapAsset::new(template.clone());
            prop_assert_eq!(asset.render(&EntryPointUrl(url)), template);
        }

        #[test]
        fn prop_exactly_one_substitution(
            prefix in "[^{}]*",
            suffix in "[^{}]*",
            url in ".*",
        ) {
            let template = format!("{prefix}{ENTRY_POINT_PLACEHOLDER}{suffix}{ENTRY_POINT_PLACEHOLDER}");
            let rendered = BootstrapAsset::new(template).render(&EntryPointUrl(url.clone()));
            prop_assert_eq!(rendered, format!("{prefix}{url}{suffix}{ENTRY_POINT_PLACEHOLDER}"));
        }
    }
}
