//! Configuration management for the query federation service
//!
//! Handles YAML file parsing, environment variable overrides, CLI overrides and
//! validation. Every tunable is passed explicitly into the components that use
//! it; nothing here is read from global state at query time.

use anyhow::{Context, Result};
use chrono::{FixedOffset, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Query dispatch configuration
    pub query: QueryConfig,
    /// Data source endpoints
    pub datasources: DataSourcesConfig,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
    /// Environment-specific settings
    pub environment: Environment,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    pub enable_cors: bool,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_size: 10 * 1024 * 1024,
            enable_cors: true,
            shutdown_timeout: 30,
        }
    }
}

/// Query dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    /// Upper bound on provider groups dispatched at the same time
    pub concurrent_query_limit: usize,
    /// Fixed UTC offset date math is evaluated in, e.g. `+02:00`
    pub utc_offset: Option<String>,
    /// First day of the week for `/w` rounding
    pub week_start: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            concurrent_query_limit: num_cpus::get(),
            utc_offset: None,
            week_start: None,
        }
    }
}

impl QueryConfig {
    pub fn location(&self) -> Result<Option<FixedOffset>> {
        self.utc_offset
            .as_deref()
            .map(|offset| {
                offset
                    .parse::<FixedOffset>()
                    .map_err(|e| anyhow::anyhow!("Invalid UTC offset {:?}: {}", offset, e))
            })
            .transpose()
    }

    pub fn week_start(&self) -> Result<Option<Weekday>> {
        self.week_start
            .as_deref()
            .map(|day| {
                day.parse::<Weekday>()
                    .map_err(|_| anyhow::anyhow!("Invalid week start {:?}", day))
            })
            .transpose()
    }
}

/// Endpoints of the known data source types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourcesConfig {
    pub loki_url: String,
    pub prometheus_url: String,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        Self {
            loki_url: "http://localhost:3100".to_string(),
            prometheus_url: "http://localhost:9090".to_string(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Environment settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow::anyhow!("Unknown environment: {}", other)),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read configuration file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse configuration file")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(env) = std::env::var("FEDERATION_ENV") {
            config = config.for_environment(env.parse()?);
        }

        if let Ok(host) = std::env::var("FEDERATION_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("FEDERATION_PORT") {
            config.server.port = port.parse().context("Invalid port number")?;
        }

        if let Ok(limit) = std::env::var("FEDERATION_CONCURRENT_QUERY_LIMIT") {
            config.query.concurrent_query_limit =
                limit.parse().context("Invalid concurrent query limit")?;
        }

        if let Ok(url) = std::env::var("LOKI_URL") {
            config.datasources.loki_url = url;
        }

        if let Ok(url) = std::env::var("PROMETHEUS_URL") {
            config.datasources.prometheus_url = url;
        }

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.telemetry.logging.level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Merge configuration with CLI arguments
    pub fn merge_with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }

        if let Some(port) = overrides.port {
            self.server.port = port;
        }

        if let Some(log_level) = overrides.log_level {
            self.telemetry.logging.level = log_level;
        }

        if let Some(limit) = overrides.concurrent_query_limit {
            self.query.concurrent_query_limit = limit;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be greater than 0"));
        }

        if self.query.concurrent_query_limit == 0 {
            return Err(anyhow::anyhow!(
                "Concurrent query limit must be greater than 0"
            ));
        }

        self.query.location()?;
        self.query.week_start()?;

        for (name, value) in [
            ("loki", &self.datasources.loki_url),
            ("prometheus", &self.datasources.prometheus_url),
        ] {
            url::Url::parse(value)
                .with_context(|| format!("Invalid {} URL: {}", name, value))?;
        }

        match self.telemetry.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(anyhow::anyhow!("Unknown log format: {}", other)),
        }

        Ok(())
    }

    /// Save configuration to a YAML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        tokio::fs::write(path, content)
            .await
            .context("Failed to write configuration file")?;

        Ok(())
    }

    /// Get environment-specific configuration
    pub fn for_environment(&self, env: Environment) -> Self {
        let mut config = self.clone();
        config.environment = env;

        match env {
            Environment::Development => {
                config.telemetry.logging.level = "debug".to_string();
                config.telemetry.logging.format = "pretty".to_string();
            }
            Environment::Testing => {
                config.telemetry.logging.level = "warn".to_string();
            }
            Environment::Production => {
                config.telemetry.logging.level = "info".to_string();
                config.telemetry.logging.format = "json".to_string();
            }
        }

        config
    }
}

/// Configuration overrides from CLI arguments
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub concurrent_query_limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.query.concurrent_query_limit >= 1);
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.query.concurrent_query_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.datasources.loki_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.query.week_start = Some("someday".to_string());
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_file_roundtrip() {
        let mut config = Config::default();
        config.query.concurrent_query_limit = 3;
        config.datasources.prometheus_url = "http://prom:9090".to_string();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).await.unwrap();
        let loaded = Config::from_file(temp_file.path()).await.unwrap();

        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.query.concurrent_query_limit, 3);
        assert_eq!(loaded.datasources, config.datasources);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(
            temp_file.path(),
            "server:\n  port: 9000\nquery:\n  weekStart: sunday\n  utcOffset: \"+02:00\"\n",
        )
        .await
        .unwrap();

        let config = Config::from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.query.week_start().unwrap(), Some(Weekday::Sun));
        assert_eq!(
            config.query.location().unwrap(),
            FixedOffset::east_opt(2 * 3600)
        );
        assert_eq!(config.datasources, DataSourcesConfig::default());
    }

    #[test]
    fn test_environment_specific_config() {
        let base_config = Config::default();
        let dev_config = base_config.for_environment(Environment::Development);
        let prod_config = base_config.for_environment(Environment::Production);

        assert_eq!(dev_config.telemetry.logging.level, "debug");
        assert_eq!(dev_config.telemetry.logging.format, "pretty");
        assert_eq!(prod_config.telemetry.logging.format, "json");
        assert_eq!(prod_config.environment, Environment::Production);
    }

    #[test]
    fn test_config_overrides() {
        let overrides = ConfigOverrides {
            host: Some("127.0.0.1".to_string()),
            port: Some(9000),
            log_level: Some("debug".to_string()),
            concurrent_query_limit: Some(2),
        };

        let config = Config::default().merge_with_overrides(overrides).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.telemetry.logging.level, "debug");
        assert_eq!(config.query.concurrent_query_limit, 2);
    }
}
