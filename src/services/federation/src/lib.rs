//! Query Federation Service Library
//!
//! Accepts one request bundling many time-series queries aimed at different
//! backend data source types, dispatches each group of queries to the plugin
//! registered for its type, and merges the per-query results into a single
//! response keyed by RefID.
//!
//! ## Architecture
//!
//! ```text
//! Query Federation Service
//! ├── Time Range (epoch ms, relative durations, date math)
//! ├── Query Parser (normalization, grouping by data source type)
//! ├── Plugin Registry (capability-set adapters, lifecycle)
//! ├── Plugin Context (per-call plugin and data source binding)
//! └── Query Service (single-provider fast path, scatter-gather)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use query_federation::{Config, QueryFederationService};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("config/query-federation.yaml").await?;
//!     let service = QueryFederationService::new(config)?;
//!
//!     service.start(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod datasources;
pub mod datemath;
pub mod error;
pub mod expr;
pub mod handlers;
pub mod models;
pub mod parser;
pub mod plugin_context;
pub mod plugins;
pub mod request_context;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod time_range;

// Re-export commonly used types
pub use config::{Config, ConfigOverrides, DataSourcesConfig};
pub use datasources::{DataSource, DataSourceRegistry, DataSourceType};
pub use error::{PluginError, QueryError};
pub use expr::{ExprQuery, ExprRequest, ExpressionService};
pub use models::{DataQuery, DataResponse, MetricRequest, QueryDataRequest, QueryDataResponse};
pub use parser::{ParsedQuery, ParsedRequest, QueryParser};
pub use plugin_context::PluginContextProvider;
pub use plugins::{InMemoryStore, Plugin, PluginClient, PluginStore, ServeOpts};
pub use request_context::RequestContext;
pub use server::{FederationServer, ServerState};
pub use service::QueryService;
pub use time_range::DataTimeRange;

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Query federation service main struct
///
/// Owns the configuration, the plugin registry and the data source registry,
/// and wires them into the query service and HTTP server.
#[derive(Debug, Clone)]
pub struct QueryFederationService {
    pub config: Arc<Config>,
    pub plugin_store: Arc<InMemoryStore>,
    pub datasources: Arc<DataSourceRegistry>,
    expressions: Option<Arc<dyn ExpressionService>>,
}

impl QueryFederationService {
    /// Create a new service instance with an empty plugin registry
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let datasources = Arc::new(DataSourceRegistry::new(&config.datasources));

        Ok(Self {
            config: Arc::new(config),
            plugin_store: Arc::new(InMemoryStore::new()),
            datasources,
            expressions: None,
        })
    }

    /// Route expression queries to `expressions`
    pub fn with_expressions(mut self, expressions: Arc<dyn ExpressionService>) -> Self {
        self.expressions = Some(expressions);
        self
    }

    /// Register an in-process provider under `id`
    pub fn register_provider(
        &self,
        id: &str,
        opts: ServeOpts,
    ) -> Result<Option<Arc<Plugin>>, PluginError> {
        self.plugin_store.register_provider(id, id, opts)
    }

    /// Register a plugin entry as is
    pub fn register_plugin(&self, plugin: Plugin) -> Arc<Plugin> {
        self.plugin_store.register(plugin)
    }

    /// Build the query dispatcher over the current registry
    pub fn query_service(&self) -> Result<QueryService> {
        let store: Arc<dyn PluginStore> = self.plugin_store.clone();
        let service = QueryService::new(
            QueryParser::new(Arc::clone(&self.datasources)),
            PluginContextProvider::new(Arc::clone(&store)),
            PluginClient::new(store),
            self.config.query.concurrent_query_limit,
        )
        .with_time_settings(
            self.config.query.location()?,
            self.config.query.week_start()?,
        );

        Ok(match &self.expressions {
            Some(expressions) => service.with_expressions(Arc::clone(expressions)),
            None => service,
        })
    }

    pub fn server_state(&self) -> Result<ServerState> {
        let store: Arc<dyn PluginStore> = self.plugin_store.clone();
        Ok(ServerState {
            config: Arc::clone(&self.config),
            query_service: self.query_service()?,
            plugin_store: Arc::clone(&store),
            plugin_client: PluginClient::new(Arc::clone(&store)),
            context_provider: PluginContextProvider::new(store),
            datasources: Arc::clone(&self.datasources),
        })
    }

    /// HTTP router over the current registry
    pub fn router(&self) -> Result<Router> {
        Ok(server::create_router(self.server_state()?))
    }

    /// Start bound plugins, then serve HTTP until `shutdown` is cancelled
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting query federation service");

        for plugin in self.plugin_store.plugins() {
            if plugin.client().is_none() {
                continue;
            }
            if let Err(e) = plugin.start().await {
                error!(plugin_id = %plugin.id, error = %e, "failed to start plugin");
            }
        }

        let server = FederationServer::new(self.server_state()?);
        server.start(shutdown).await?;

        self.stop().await;
        Ok(())
    }

    /// Stop every registered plugin
    pub async fn stop(&self) {
        for plugin in self.plugin_store.plugins() {
            if let Err(e) = plugin.stop().await {
                error!(plugin_id = %plugin.id, error = %e, "failed to stop plugin");
            }
        }
        info!("Query federation service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_creation() {
        let service = QueryFederationService::new(Config::default()).unwrap();
        assert!(service.plugin_store.is_empty());
        assert_eq!(service.datasources.all().count(), 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.query.concurrent_query_limit = 0;
        assert!(QueryFederationService::new(config).is_err());
    }

    #[test]
    fn test_query_service_uses_configured_limit() {
        let mut config = Config::default();
        config.query.concurrent_query_limit = 3;
        let service = QueryFederationService::new(config).unwrap();
        assert_eq!(service.query_service().unwrap().concurrent_query_limit(), 3);
    }

    #[tokio::test]
    async fn test_stop_with_unbound_plugins() {
        let service = QueryFederationService::new(Config::default()).unwrap();
        service.register_plugin(Plugin::new("loki"));
        service.stop().await;
        assert_eq!(service.plugin_store.len(), 1);
    }
}
