//! Data source resource handler

use super::request_context_from_headers;
use crate::models::CallResourceRequest;
use crate::server::ServerState;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// `ANY /api/datasources/uid/:uid/resources/*path`
pub async fn call_datasource_resource(
    State(state): State<ServerState>,
    Path((uid, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ds = match state.datasources.get(&uid) {
        Ok(ds) => ds,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "message": "Data source not found",
                    "messageId": "datasource.notFound",
                    "statusCode": 404,
                })),
            )
                .into_response()
        }
    };

    let ctx = request_context_from_headers(&headers);
    let mut plugin_context = match state.context_provider.get_with_data_source(&ds.ds_type, &ds) {
        Ok(plugin_context) => plugin_context,
        Err(e) => return e.into_response(),
    };
    plugin_context.org_id = ctx.org_id();

    let mut forwarded: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in ctx.request_headers().iter() {
        forwarded
            .entry(name.clone())
            .or_default()
            .push(value.clone());
    }

    debug!(datasource = %ds.ds_type, path = %path, method = %method, "forwarding resource call");

    let req = CallResourceRequest {
        plugin_context,
        path,
        method: method.to_string(),
        url: uri.to_string(),
        headers: forwarded,
        body: body.to_vec(),
    };

    let resp = match state.plugin_client.call_resource(&ctx, req).await {
        Ok(resp) => resp,
        Err(e) => return e.into_response(),
    };

    let mut response = Response::new(Body::from(resp.body));
    *response.status_mut() = StatusCode::from_u16(resp.status).unwrap_or_else(|_| {
        warn!(status = resp.status, "plugin returned invalid status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });
    for (name, values) in resp.headers {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::try_from(value) {
                response.headers_mut().append(name.clone(), value);
            }
        }
    }
    response
}
