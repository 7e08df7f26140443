//! Known data source types
//!
//! The set of provider types is fixed at compile time; only their endpoints come
//! from configuration. Looking up an unknown type is always an error.

use crate::config::DataSourcesConfig;
use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provider type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceType(String);

impl DataSourceType {
    pub const LOKI: &'static str = "loki";
    pub const PROMETHEUS: &'static str = "prometheus";
    /// Reserved type for queries evaluated by the expression pipeline
    pub const EXPRESSION: &'static str = "__expr__";

    pub fn new(ds_type: impl Into<String>) -> Self {
        Self(ds_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_expression(&self) -> bool {
        self.0 == Self::EXPRESSION
    }
}

impl fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataSourceType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Provider type plus connection endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub ds_type: DataSourceType,
    pub url: String,
}

/// Fixed registry of known data sources
#[derive(Debug, Clone)]
pub struct DataSourceRegistry {
    sources: BTreeMap<DataSourceType, DataSource>,
}

impl DataSourceRegistry {
    pub fn new(config: &DataSourcesConfig) -> Self {
        let sources = [
            (DataSourceType::LOKI, config.loki_url.clone()),
            (DataSourceType::PROMETHEUS, config.prometheus_url.clone()),
            (DataSourceType::EXPRESSION, String::new()),
        ]
        .into_iter()
        .map(|(ds_type, url)| {
            let ds_type = DataSourceType::new(ds_type);
            (ds_type.clone(), DataSource { ds_type, url })
        })
        .collect();

        Self { sources }
    }

    /// Resolve a data source by its type tag
    pub fn get(&self, ds_type: &str) -> Result<DataSource> {
        self.sources
            .get(&DataSourceType::new(ds_type))
            .cloned()
            .ok_or_else(|| QueryError::InvalidDatasourceIdentifier {
                identifier: ds_type.to_string(),
            })
    }

    /// All known data sources
    pub fn all(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.values()
    }
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new(&DataSourcesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types_resolve_with_configured_urls() {
        let config = DataSourcesConfig {
            loki_url: "http://loki:3100".to_string(),
            prometheus_url: "http://prometheus:9090".to_string(),
        };
        let registry = DataSourceRegistry::new(&config);

        let loki = registry.get("loki").unwrap();
        assert_eq!(loki.ds_type.as_str(), "loki");
        assert_eq!(loki.url, "http://loki:3100");

        let prometheus = registry.get("prometheus").unwrap();
        assert_eq!(prometheus.ds_type.as_str(), "prometheus");
        assert_eq!(prometheus.url, "http://prometheus:9090");

        assert!(registry.get("__expr__").unwrap().ds_type.is_expression());
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let registry = DataSourceRegistry::default();
        assert_eq!(
            registry.get("mysql"),
            Err(QueryError::InvalidDatasourceIdentifier {
                identifier: "mysql".to_string()
            })
        );
        assert!(registry.get("").is_err());
        assert!(registry.get("Loki").is_err());
    }
}
