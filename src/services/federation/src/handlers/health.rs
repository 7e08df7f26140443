//! Service health handler

use crate::server::ServerState;
use axum::{extract::State, response::Json};

/// Liveness document
pub async fn health_check(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "query-federation",
        "version": env!("CARGO_PKG_VERSION"),
        "plugins": state.plugin_store.plugins().len(),
        "timestamp": chrono::Utc::now(),
    }))
}
