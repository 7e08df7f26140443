//! Federated query handler

use super::{request_context_from_headers, STATUS_SOURCE_HEADER};
use crate::models::MetricRequest;
use crate::server::ServerState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::debug;

/// `POST /api/ds/query`
///
/// Answers 200 when every RefID succeeded and 400 when any carries an error.
pub async fn query_metrics(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<MetricRequest>,
) -> Response {
    let ctx = request_context_from_headers(&headers);
    // Cancels in-flight sub-queries if the client goes away
    let _guard = ctx.cancellation_token().clone().drop_guard();

    debug!(queries = req.queries.len(), from = %req.from, to = %req.to, "received query request");

    let resp = match state.query_service.query_data(ctx.clone(), req).await {
        Ok(resp) => resp,
        Err(e) => return e.into_response(),
    };

    let status = if resp.has_errors() {
        ctx.mark_downstream_error();
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    let mut response = (status, Json(resp)).into_response();
    append_provider_headers(response.headers_mut(), &ctx.response_headers());
    if ctx.is_downstream_error() {
        response.headers_mut().insert(
            STATUS_SOURCE_HEADER,
            HeaderValue::from_static("downstream"),
        );
    }
    response
}

/// Append every provider header value; names the response already sets are kept
fn append_provider_headers(target: &mut HeaderMap, provider: &HeaderMap) {
    for name in provider.keys() {
        if target.contains_key(name) {
            continue;
        }
        for value in provider.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    #[test]
    fn test_provider_headers_are_appended() {
        let mut response = HeaderMap::new();
        response.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut provider = HeaderMap::new();
        provider.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        provider.append("x-cache", HeaderValue::from_static("hit"));
        provider.append("x-cache", HeaderValue::from_static("miss"));

        append_provider_headers(&mut response, &provider);

        assert_eq!(response.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(response.get_all(CONTENT_TYPE).iter().count(), 1);
        let cache: Vec<_> = response.get_all("x-cache").iter().collect();
        assert_eq!(cache, vec!["hit", "miss"]);
    }
}
