//! Query Federation HTTP Server
//!
//! Exposes the federated query endpoint together with plugin introspection,
//! plugin health and data source resource routes.

use crate::{
    config::Config,
    datasources::DataSourceRegistry,
    error::{PluginError, QueryError},
    handlers,
    plugin_context::PluginContextProvider,
    plugins::{PluginClient, PluginStore},
    service::QueryService,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Server state shared across all handlers
#[derive(Debug, Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub query_service: QueryService,
    pub plugin_store: Arc<dyn PluginStore>,
    pub plugin_client: PluginClient,
    pub context_provider: PluginContextProvider,
    pub datasources: Arc<DataSourceRegistry>,
}

/// Query federation HTTP server
#[derive(Debug)]
pub struct FederationServer {
    state: ServerState,
    router: Router,
}

impl FederationServer {
    pub fn new(state: ServerState) -> Self {
        let router = create_router(state.clone());
        Self { state, router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight requests for
    /// at most `shutdownTimeout` seconds
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        );

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to address {}: {}", addr, e))?;

        info!("Query federation service listening on {}", addr);

        let drain_timeout = Duration::from_secs(self.state.config.server.shutdown_timeout);
        serve_with_drain_timeout(listener, self.router.clone(), shutdown, drain_timeout).await
    }
}

async fn serve_with_drain_timeout(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(serve);

    let result = tokio::select! {
        result = &mut serve => result,
        _ = shutdown.cancelled() => {
            match tokio::time::timeout(drain_timeout, &mut serve).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_secs = drain_timeout.as_secs(),
                        "graceful shutdown timed out, dropping in-flight requests"
                    );
                    Ok(())
                }
            }
        }
    };

    result.map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

/// Create the HTTP router with all routes and middleware
pub fn create_router(state: ServerState) -> Router {
    let cors_layer = if state.config.server.enable_cors {
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .allow_origin(Any)
    } else {
        CorsLayer::new()
    };
    let max_request_size = state.config.server.max_request_size;

    Router::new()
        .route("/api/health", get(handlers::health::health_check))
        // Federated queries
        .route("/api/ds/query", post(handlers::query::query_metrics))
        .route("/ds/query", post(handlers::query::query_metrics))
        // Plugins
        .route("/api/plugins", get(handlers::plugins::list_plugins))
        .route(
            "/api/plugins/:plugin_id/health",
            get(handlers::plugins::check_plugin_health),
        )
        // Data source resources
        .route(
            "/api/datasources/uid/:uid/resources/*path",
            any(handlers::resources::call_datasource_resource),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(DefaultBodyLimit::max(max_request_size))
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            error!(error = %self, message_id = self.message_id(), "query request failed");
        } else {
            info!(error = %self, message_id = self.message_id(), "query request rejected");
        }

        let body = serde_json::json!({
            "message": self.public_message(),
            "messageId": self.message_id(),
            "statusCode": status_code.as_u16(),
        });

        (status_code, Json(body)).into_response()
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        QueryError::Plugin(self).into_response()
    }
}
