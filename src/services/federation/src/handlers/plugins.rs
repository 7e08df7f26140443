//! Plugin introspection and health handlers

use super::request_context_from_headers;
use crate::datasources::DataSourceType;
use crate::error::PluginError;
use crate::models::{CheckHealthRequest, HealthStatus};
use crate::plugins::Target;
use crate::server::ServerState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub id: String,
    pub signature: Option<String>,
    pub target: Target,
    pub managed: bool,
    pub decommissioned: bool,
}

/// `GET /api/plugins`
pub async fn list_plugins(State(state): State<ServerState>) -> Json<Vec<PluginSummary>> {
    let mut plugins: Vec<PluginSummary> = state
        .plugin_store
        .plugins()
        .into_iter()
        .map(|p| PluginSummary {
            id: p.id.clone(),
            signature: p.signature.clone(),
            target: p.target(),
            managed: p.is_managed(),
            decommissioned: p.is_decommissioned(),
        })
        .collect();
    plugins.sort_by(|a, b| a.id.cmp(&b.id));
    Json(plugins)
}

/// `GET /api/plugins/:plugin_id/health`
///
/// 200 when the plugin reports healthy, 503 with the report otherwise.
pub async fn check_plugin_health(
    State(state): State<ServerState>,
    Path(plugin_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PluginError> {
    let ctx = request_context_from_headers(&headers);
    let plugin_context = state
        .context_provider
        .get(&DataSourceType::new(plugin_id.as_str()), ctx.org_id())?;

    let result = state
        .plugin_client
        .check_health(&ctx, CheckHealthRequest { plugin_context })
        .await?;

    let status = if result.status == HealthStatus::Ok {
        StatusCode::OK
    } else {
        warn!(plugin_id = %plugin_id, message = %result.message, "plugin health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((status, Json(result)).into_response())
}
