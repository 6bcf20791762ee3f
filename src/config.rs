//! Library configuration.
//!
//! [`JsonApiConfig`] controls the route conventions and request handling
//! policies of a mounted API. Host applications usually build one in code,
//! but the struct deserializes with serde so it can live inside a larger
//! application config. [`JsonApiConfig::load`] offers standalone loading the
//! same way larger services do it: a YAML file merged with
//! `JUNCTION_`-prefixed environment variables, `__` separating nested keys
//! (`JUNCTION_PAGINATION__MAX_SIZE=500`).

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;
use url::Url;

/// Configuration for a [`JsonApi`](crate::JsonApi) mount.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonApiConfig {
    /// Path prefix all resources are mounted under, e.g. `/api/v1`.
    /// Must not end with a slash; empty means the router root.
    pub base_path: String,

    /// Optional absolute prefix (scheme + authority) for generated links.
    /// When unset, links are root-relative paths.
    pub url_prefix: Option<Url>,

    /// Reject POST/PATCH requests whose `Content-Type` is not
    /// `application/vnd.api+json` with a 400 error document.
    pub enforce_content_type: bool,

    /// Defaults for `page[...]` parameters.
    pub pagination: PaginationConfig,
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            url_prefix: None,
            enforce_content_type: true,
            pagination: PaginationConfig::default(),
        }
    }
}

/// Page size policy for the built-in paginator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    /// Page size used when the request does not carry `page[size]`.
    pub default_size: usize,
    /// Upper bound requested sizes are clamped to.
    pub max_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: 50,
            max_size: 100,
        }
    }
}

impl JsonApiConfig {
    /// The figment used by [`load`](Self::load): optional YAML file, then
    /// `JUNCTION_` environment variables (later sources win).
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = config_file {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed("JUNCTION_").split("__"))
    }

    /// Load and validate configuration from file + environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(config_file).extract()?;
        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.base_path.ends_with('/') {
            return Err(format!("base_path must not end with '/': {:?}", self.base_path));
        }
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(format!("base_path must start with '/': {:?}", self.base_path));
        }
        if self.pagination.default_size == 0 {
            return Err("pagination.default_size must be at least 1".to_string());
        }
        if self.pagination.max_size < self.pagination.default_size {
            return Err(format!(
                "pagination.max_size ({}) must not be smaller than pagination.default_size ({})",
                self.pagination.max_size, self.pagination.default_size
            ));
        }
        Ok(())
    }

    /// The absolute link prefix, without a trailing slash.
    pub(crate) fn link_prefix(&self) -> Option<String> {
        self.url_prefix.as_ref().map(|url| {
            let mut prefix = url.as_str().to_string();
            while prefix.ends_with('/') {
                prefix.pop();
            }
            prefix
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = JsonApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_path, "");
        assert!(config.enforce_content_type);
        assert_eq!(config.pagination.default_size, 50);
        assert_eq!(config.pagination.max_size, 100);
    }

    #[test]
    fn env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "junction.yaml",
                r#"
base_path: /api/v1
pagination:
  default_size: 20
  max_size: 200
"#,
            )?;
            jail.set_env("JUNCTION_PAGINATION__MAX_SIZE", "500");

            let config = JsonApiConfig::load(Some(Path::new("junction.yaml"))).expect("config should load");
            assert_eq!(config.base_path, "/api/v1");
            assert_eq!(config.pagination.default_size, 20);
            assert_eq!(config.pagination.max_size, 500);
            Ok(())
        });
    }

    #[test]
    fn rejects_trailing_slash_base_path() {
        Jail::expect_with(|jail| {
            jail.set_env("JUNCTION_BASE_PATH", "/api/");
            assert!(JsonApiConfig::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn rejects_max_size_below_default_size() {
        Jail::expect_with(|jail| {
            jail.set_env("JUNCTION_PAGINATION__DEFAULT_SIZE", "80");
            jail.set_env("JUNCTION_PAGINATION__MAX_SIZE", "40");
            assert!(JsonApiConfig::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn link_prefix_strips_trailing_slash() {
        let config = JsonApiConfig {
            url_prefix: Some(Url::parse("https://api.example.com/").unwrap()),
            ..JsonApiConfig::default()
        };
        assert_eq!(config.link_prefix().as_deref(), Some("https://api.example.com"));
    }
}
