//! End-to-end tests driving the HTTP router with in-process plugins

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use query_federation::models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    HealthStatus, TimeRange,
};
use query_federation::plugins::{CallResourceHandler, CheckHealthHandler, QueryDataHandler};
use query_federation::{
    Config, DataResponse, Plugin, PluginError, QueryDataRequest, QueryDataResponse,
    QueryFederationService, RequestContext, ServeOpts,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingProvider {
    fail: bool,
    requests: Mutex<Vec<QueryDataRequest>>,
}

#[async_trait]
impl QueryDataHandler for RecordingProvider {
    async fn query_data(
        &self,
        _ctx: &RequestContext,
        req: QueryDataRequest,
    ) -> Result<QueryDataResponse, PluginError> {
        self.requests.lock().push(req.clone());
        if self.fail {
            return Err(PluginError::Backend("upstream timeout".to_string()));
        }

        let mut resp = QueryDataResponse::new();
        for q in &req.queries {
            resp.responses.insert(
                q.ref_id.clone(),
                DataResponse::frames(vec![json!({"plugin": req.plugin_context.plugin_id})]),
            );
        }
        Ok(resp)
    }
}

#[async_trait]
impl CheckHealthHandler for RecordingProvider {
    async fn check_health(
        &self,
        _ctx: &RequestContext,
        _req: CheckHealthRequest,
    ) -> Result<CheckHealthResult, PluginError> {
        Ok(CheckHealthResult {
            status: if self.fail {
                HealthStatus::Error
            } else {
                HealthStatus::Ok
            },
            message: "checked".to_string(),
            json_details: None,
        })
    }
}

#[async_trait]
impl CallResourceHandler for RecordingProvider {
    async fn call_resource(
        &self,
        _ctx: &RequestContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, PluginError> {
        let body = json!({
            "path": req.path,
            "method": req.method,
            "url": req.plugin_context.data_source_instance_settings.map(|s| s.url),
        });
        let mut headers = HashMap::new();
        headers.insert("x-plugin".to_string(), vec!["loki".to_string()]);
        Ok(CallResourceResponse {
            status: 202,
            headers,
            body: body.to_string().into_bytes(),
        })
    }
}

struct Harness {
    router: Router,
    loki: Arc<RecordingProvider>,
    prometheus: Arc<RecordingProvider>,
}

fn harness(prometheus_fails: bool) -> Harness {
    let service = QueryFederationService::new(Config::default()).unwrap();

    let loki = Arc::new(RecordingProvider::default());
    let prometheus = Arc::new(RecordingProvider {
        fail: prometheus_fails,
        ..Default::default()
    });

    service
        .register_provider(
            "loki",
            ServeOpts::new()
                .with_query_data(loki.clone())
                .with_check_health(loki.clone())
                .with_call_resource(loki.clone()),
        )
        .unwrap();
    service
        .register_provider(
            "prometheus",
            ServeOpts::new()
                .with_query_data(prometheus.clone())
                .with_check_health(prometheus.clone()),
        )
        .unwrap();

    Harness {
        router: service.router().unwrap(),
        loki,
        prometheus,
    }
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null), headers)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn mixed_request() -> Value {
    json!({
        "from": "now-1h",
        "to": "now",
        "queries": [
            {"refId": "A", "datasource": {"type": "loki"}, "expr": "{job=\"api\"}"},
            {"refId": "B", "datasource": {"type": "prometheus"}, "expr": "up"}
        ]
    })
}

#[tokio::test]
async fn test_loki_and_prometheus_are_federated() {
    let h = harness(false);

    let (status, body, headers) = post_json(&h.router, "/api/ds/query", mixed_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-status-source").is_none());
    assert_eq!(body["results"]["A"]["frames"][0]["plugin"], "loki");
    assert_eq!(body["results"]["B"]["frames"][0]["plugin"], "prometheus");

    let loki = h.loki.requests.lock();
    let prometheus = h.prometheus.requests.lock();
    assert_eq!(loki.len(), 1);
    assert_eq!(prometheus.len(), 1);
    assert_eq!(loki[0].queries[0].ref_id, "A");
    assert_eq!(prometheus[0].queries[0].ref_id, "B");
    assert_eq!(
        loki[0]
            .plugin_context
            .data_source_instance_settings
            .as_ref()
            .unwrap()
            .url,
        "http://localhost:3100"
    );
    assert_eq!(
        prometheus[0]
            .plugin_context
            .data_source_instance_settings
            .as_ref()
            .unwrap()
            .url,
        "http://localhost:9090"
    );
}

#[tokio::test]
async fn test_legacy_route_and_absolute_time() {
    let h = harness(false);

    let (status, _, _) = post_json(
        &h.router,
        "/ds/query",
        json!({
            "from": "1700000000000",
            "to": "1700003600000",
            "queries": [{"refId": "A", "datasource": "loki", "maxDataPoints": 500}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let requests = h.loki.requests.lock();
    let query = &requests[0].queries[0];
    assert_eq!(
        query.time_range,
        TimeRange {
            from: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            to: Utc.timestamp_millis_opt(1_700_003_600_000).unwrap(),
        }
    );
    assert_eq!(query.max_data_points, 500);
}

#[tokio::test]
async fn test_partial_failure_is_reported_per_ref_id() {
    let h = harness(true);

    let (status, body, headers) = post_json(&h.router, "/api/ds/query", mixed_request()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers.get("x-status-source").unwrap(), "downstream");
    assert_eq!(body["results"]["A"]["frames"][0]["plugin"], "loki");
    assert_eq!(body["results"]["B"]["error"], "upstream timeout");
}

#[tokio::test]
async fn test_parse_errors() {
    let h = harness(false);

    let (status, body, _) = post_json(
        &h.router,
        "/api/ds/query",
        json!({"from": "now-1h", "to": "now", "queries": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["messageId"], "query.noQueries");

    let (status, body, _) = post_json(
        &h.router,
        "/api/ds/query",
        json!({
            "from": "now-1h",
            "to": "now",
            "queries": [{"refId": "A", "datasource": {"type": "mysql"}}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["messageId"], "query.invalidDatasourceId");
    assert!(h.loki.requests.lock().is_empty());
}

#[tokio::test]
async fn test_unbound_plugin_is_unavailable() {
    let service = QueryFederationService::new(Config::default()).unwrap();
    service.register_plugin(Plugin::new("loki"));
    let router = service.router().unwrap();

    let (status, body, _) = post_json(
        &router,
        "/api/ds/query",
        json!({
            "from": "now-5m",
            "to": "now",
            "queries": [{"refId": "A", "datasource": {"type": "loki"}}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["messageId"], "plugin.unavailable");
}

#[tokio::test]
async fn test_plugin_listing_and_health() {
    let h = harness(true);

    let (status, body) = get(&h.router, "/api/plugins").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["loki", "prometheus"]);
    assert_eq!(body[0]["target"], "in_memory");

    let (status, body) = get(&h.router, "/api/plugins/loki/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, _) = get(&h.router, "/api/plugins/prometheus/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = get(&h.router, "/api/plugins/mysql/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&h.router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plugins"], 2);
}

#[tokio::test]
async fn test_datasource_resources() {
    let h = harness(false);

    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/datasources/uid/loki/resources/labels/job/values")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers().get("x-plugin").unwrap(), "loki");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["path"], "labels/job/values");
    assert_eq!(body["method"], "GET");
    assert_eq!(body["url"], "http://localhost:3100");

    // Prometheus offers no resource handler
    let (status, _) = get(&h.router, "/api/datasources/uid/prometheus/resources/api/v1/labels").await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, _) = get(&h.router, "/api/datasources/uid/mysql/resources/tables").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
