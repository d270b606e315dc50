use serde::{Deserialize, Serialize};

use crate::scim::{
    FeatureSupport, FilterSupport, ResourceKind, SchemaRegistry, ScimSchema, ServiceProviderConfig,
};

/// SCIM protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScimConfig {
    /// Upper bound on `count` for list and search requests.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Page size when a request does not give `count`.
    #[serde(default = "default_count")]
    pub default_count: u32,

    /// Enterprise User extension (RFC 7643 Section 4.3).
    #[serde(default)]
    pub enterprise_extension: ExtensionConfig,

    /// Also serve the SCIM 1.1 wire format under `/scim/v1`.
    #[serde(default)]
    pub legacy_v1: bool,

    #[serde(default)]
    pub patch: FeatureToggle,

    #[serde(default)]
    pub filter: FeatureToggle,

    #[serde(default)]
    pub sort: FeatureToggle,

    /// Documentation URI advertised in `/ServiceProviderConfig`.
    #[serde(default)]
    pub documentation_uri: Option<String>,
}

impl Default for ScimConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            default_count: default_count(),
            enterprise_extension: ExtensionConfig::default(),
            legacy_v1: false,
            patch: FeatureToggle::default(),
            filter: FeatureToggle::default(),
            sort: FeatureToggle::default(),
            documentation_uri: None,
        }
    }
}

impl ScimConfig {
    pub(super) fn validate(&self) -> Result<(), String> {
        if self.max_results == 0 {
            return Err("scim.max_results must be at least 1".into());
        }
        if self.default_count > self.max_results {
            return Err(format!(
                "scim.default_count ({}) exceeds scim.max_results ({})",
                self.default_count, self.max_results
            ));
        }
        if self.enterprise_extension.required && !self.enterprise_extension.enabled {
            return Err("scim.enterprise_extension.required needs enabled = true".into());
        }
        Ok(())
    }

    /// Schema registry for the configured extensions.
    pub fn schema_registry(&self) -> SchemaRegistry {
        let registry = SchemaRegistry::core();
        if self.enterprise_extension.enabled {
            registry.with_extension(
                ResourceKind::User,
                ScimSchema::enterprise_user(),
                self.enterprise_extension.required,
            )
        } else {
            registry
        }
    }

    /// The `/ServiceProviderConfig` document.
    pub fn service_provider_config(&self) -> ServiceProviderConfig {
        ServiceProviderConfig {
            documentation_uri: self.documentation_uri.clone(),
            patch: FeatureSupport {
                supported: self.patch.enabled,
            },
            filter: FilterSupport {
                supported: self.filter.enabled,
                max_results: self.max_results,
            },
            sort: FeatureSupport {
                supported: self.sort.enabled,
            },
            ..ServiceProviderConfig::default()
        }
    }
}

fn default_max_results() -> u32 {
    200
}

fn default_count() -> u32 {
    100
}

/// Whether an extension schema is registered, and whether resources must carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub required: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
        }
    }
}

/// An optional protocol feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for FeatureToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scim::{SchemaLookup, types::SCHEMA_ENTERPRISE_USER};

    #[test]
    fn test_registry_follows_extension_config() {
        let config = ScimConfig::default();
        let registry = config.schema_registry();
        assert!(registry.is_known_extension(SCHEMA_ENTERPRISE_USER));
        assert!(registry.required_extensions(ResourceKind::User).is_empty());

        let config: ScimConfig = toml::from_str("[enterprise_extension]\nrequired = true").unwrap();
        assert_eq!(
            config.schema_registry().required_extensions(ResourceKind::User),
            vec![SCHEMA_ENTERPRISE_USER.to_string()]
        );

        let config: ScimConfig = toml::from_str("[enterprise_extension]\nenabled = false").unwrap();
        assert!(!config.schema_registry().is_known_extension(SCHEMA_ENTERPRISE_USER));
    }

    #[test]
    fn test_service_provider_config_reflects_toggles() {
        let config: ScimConfig =
            toml::from_str("max_results = 50\ndefault_count = 10\n[sort]\nenabled = false")
                .unwrap();
        let spc = config.service_provider_config();
        assert!(spc.patch.supported);
        assert!(!spc.sort.supported);
        assert_eq!(spc.filter.max_results, 50);
    }
}
