//! Data models and structures for the query federation service
//!
//! This module defines the caller-facing request shape, the per-query descriptors
//! handed to plugins, and the request/response envelopes of every plugin capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

// ================================================================================================
// Caller Request Models
// ================================================================================================

/// Incoming query request bundling any number of sub-queries
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequest {
    /// Start of the time window: epoch milliseconds, relative duration or date math
    pub from: String,
    /// End of the time window, same grammar as `from`
    pub to: String,
    /// Raw query documents, each expected to carry `refId` and `datasource`
    #[serde(default)]
    pub queries: Vec<Value>,
    /// Debug flag forwarded untouched
    #[serde(default)]
    pub debug: bool,
}

impl MetricRequest {
    /// Structural copy of this request with the queries replaced
    pub fn clone_with_queries(&self, queries: Vec<Value>) -> MetricRequest {
        MetricRequest {
            from: self.from.clone(),
            to: self.to.clone(),
            queries,
            debug: self.debug,
        }
    }
}

/// Extract the datasource type from a raw query document.
///
/// Accepts both `{"datasource": {"type": "loki"}}` and the older
/// `{"datasource": "loki"}` shape.
pub fn datasource_type_of(query: &Value) -> Option<&str> {
    match query.get("datasource")? {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("type").and_then(Value::as_str),
        _ => None,
    }
}

/// RefID of a raw query document, `"A"` when absent
pub fn ref_id_of(query: &Value) -> String {
    query
        .get("refId")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_REF_ID)
        .to_string()
}

pub const DEFAULT_REF_ID: &str = "A";
pub const DEFAULT_MAX_DATA_POINTS: i64 = 100;
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

// ================================================================================================
// Plugin Query Models
// ================================================================================================

/// Absolute time range in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// One normalized query as seen by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    /// Caller-assigned identifier
    pub ref_id: String,
    /// Optional query type discriminator
    pub query_type: String,
    /// Maximum number of points the caller can render
    pub max_data_points: i64,
    /// Sampling interval
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Absolute time window
    pub time_range: TimeRange,
    /// Serialized original query document
    pub json: String,
}

/// Capability call request for query execution
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDataRequest {
    pub plugin_context: PluginContext,
    /// Inbound request headers forwarded to the plugin
    pub headers: HashMap<String, String>,
    pub queries: Vec<DataQuery>,
}

/// Result for one RefID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    /// Opaque data frames produced by the plugin
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Value>,
    /// Error message when the query failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    pub fn frames(frames: Vec<Value>) -> Self {
        Self {
            frames,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Aggregate response keyed by RefID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataResponse {
    #[serde(rename = "results")]
    pub responses: BTreeMap<String, DataResponse>,
}

impl QueryDataResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any RefID carries an error
    pub fn has_errors(&self) -> bool {
        self.responses.values().any(|r| r.error.is_some())
    }
}

// ================================================================================================
// Plugin Context Models
// ================================================================================================

/// Per-call binding of plugin identity and optional data source instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub plugin_id: String,
    /// Organization scope the call runs under
    pub org_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source_instance_settings: Option<DataSourceInstanceSettings>,
}

/// Resolved data source instance descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInstanceSettings {
    #[serde(rename = "type")]
    pub ds_type: String,
    pub name: String,
    pub url: String,
    pub uid: String,
    pub json_data: Value,
}

// ================================================================================================
// Plugin Capability Models
// ================================================================================================

/// Resource call forwarded to a plugin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResourceRequest {
    pub plugin_context: PluginContext,
    pub path: String,
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

/// Resource call result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResourceResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckHealthRequest {
    pub plugin_context: PluginContext,
}

/// Plugin health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Unknown,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectMetricsRequest {
    pub plugin_context: PluginContext,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectMetricsResult {
    /// Metrics in Prometheus text exposition format
    pub prometheus_metrics: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeStreamRequest {
    pub plugin_context: PluginContext,
    pub path: String,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStreamStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeStreamResponse {
    pub status: SubscribeStreamStatus,
    pub initial_data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishStreamRequest {
    pub plugin_context: PluginContext,
    pub path: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStreamStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishStreamResponse {
    pub status: PublishStreamStatus,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStreamRequest {
    pub plugin_context: PluginContext,
    pub path: String,
    pub data: Option<Value>,
}

/// Packet emitted by a running stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPacket {
    pub data: Value,
}

/// Channel a running stream pushes packets into
pub type StreamSender = tokio::sync::mpsc::Sender<StreamPacket>;

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_with_queries_keeps_window() {
        let req = MetricRequest {
            from: "now-1h".to_string(),
            to: "now".to_string(),
            queries: vec![json!({"refId": "A"}), json!({"refId": "B"})],
            debug: true,
        };

        let sub = req.clone_with_queries(vec![json!({"refId": "B"})]);
        assert_eq!(sub.from, "now-1h");
        assert_eq!(sub.to, "now");
        assert!(sub.debug);
        assert_eq!(sub.queries.len(), 1);
        assert_eq!(req.queries.len(), 2);
    }

    #[test]
    fn test_datasource_type_shapes() {
        assert_eq!(
            datasource_type_of(&json!({"datasource": {"type": "loki"}})),
            Some("loki")
        );
        assert_eq!(
            datasource_type_of(&json!({"datasource": "prometheus"})),
            Some("prometheus")
        );
        assert_eq!(datasource_type_of(&json!({"refId": "D"})), None);
        assert_eq!(datasource_type_of(&json!({"datasource": 7})), None);
    }

    #[test]
    fn test_ref_id_defaults_to_a() {
        assert_eq!(ref_id_of(&json!({})), "A");
        assert_eq!(ref_id_of(&json!({"refId": 3})), "A");
        assert_eq!(ref_id_of(&json!({"refId": "Z"})), "Z");
    }

    #[test]
    fn test_metric_request_deserializes_without_optional_fields() {
        let req: MetricRequest =
            serde_json::from_value(json!({"from": "now-5m", "to": "now"})).unwrap();
        assert!(req.queries.is_empty());
        assert!(!req.debug);
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let mut resp = QueryDataResponse::new();
        resp.responses
            .insert("A".to_string(), DataResponse::error("boom"));
        resp.responses
            .insert("B".to_string(), DataResponse::frames(vec![json!({"name": "x"})]));

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["results"]["A"], json!({"error": "boom"}));
        assert_eq!(value["results"]["B"], json!({"frames": [{"name": "x"}]}));
        assert!(resp.has_errors());
    }
}
