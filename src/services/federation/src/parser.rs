//! Query request parsing
//!
//! Turns a [`MetricRequest`] into normalized query descriptors grouped by the
//! provider type each query targets.

use crate::datasources::{DataSource, DataSourceRegistry, DataSourceType};
use crate::error::{QueryError, Result};
use crate::models::{
    datasource_type_of, ref_id_of, DataQuery, MetricRequest, DEFAULT_INTERVAL_MS,
    DEFAULT_MAX_DATA_POINTS,
};
use crate::time_range::DataTimeRange;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One normalized query
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub datasource: Option<DataSource>,
    pub query: DataQuery,
    /// Original document, reused verbatim when building sub-requests
    pub raw_query: Value,
}

/// Queries grouped by provider type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    /// At least one query needs the expression pipeline
    pub has_expression: bool,
    /// Groups keyed by provider type, caller order inside each group
    pub parsed_queries: BTreeMap<DataSourceType, Vec<ParsedQuery>>,
    /// Distinct provider types encountered
    pub ds_types: BTreeSet<DataSourceType>,
}

impl ParsedRequest {
    /// All queries, group by group
    pub fn flattened_queries(&self) -> impl Iterator<Item = &ParsedQuery> {
        self.parsed_queries.values().flatten()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for pq in self.flattened_queries() {
            if !seen.insert(pq.query.ref_id.as_str()) {
                return Err(QueryError::DuplicateRefId {
                    ref_id: pq.query.ref_id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QueryParser {
    datasources: Arc<DataSourceRegistry>,
}

impl QueryParser {
    pub fn new(datasources: Arc<DataSourceRegistry>) -> Self {
        Self { datasources }
    }

    /// Parse a request, resolving its time window against a single `now`
    pub fn parse(&self, req: &MetricRequest) -> Result<ParsedRequest> {
        self.parse_with_range(req, &DataTimeRange::new(&req.from, &req.to))
    }

    /// Parse a request against an already anchored time window
    pub fn parse_with_range(
        &self,
        req: &MetricRequest,
        time_range: &DataTimeRange,
    ) -> Result<ParsedRequest> {
        if req.queries.is_empty() {
            return Err(QueryError::NoQueriesFound);
        }

        let window = time_range.resolve();
        let mut parsed = ParsedRequest::default();

        for raw in &req.queries {
            let ds = self.data_source_from_query(raw)?;
            debug!(query = %raw, datasource = %ds.ds_type, "processing metrics query");

            let json = serde_json::to_string(raw).map_err(|e| QueryError::Internal {
                message: format!("failed to serialize query: {}", e),
            })?;

            let query = DataQuery {
                ref_id: ref_id_of(raw),
                query_type: raw
                    .get("queryType")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                max_data_points: raw
                    .get("maxDataPoints")
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_MAX_DATA_POINTS),
                interval: Duration::from_millis(
                    raw.get("intervalMs")
                        .and_then(Value::as_u64)
                        .unwrap_or(DEFAULT_INTERVAL_MS as u64),
                ),
                time_range: window,
                json,
            };

            if ds.ds_type.is_expression() {
                parsed.has_expression = true;
            }
            parsed.ds_types.insert(ds.ds_type.clone());
            parsed
                .parsed_queries
                .entry(ds.ds_type.clone())
                .or_default()
                .push(ParsedQuery {
                    datasource: Some(ds),
                    query,
                    raw_query: raw.clone(),
                });
        }

        parsed.validate()?;
        Ok(parsed)
    }

    fn data_source_from_query(&self, query: &Value) -> Result<DataSource> {
        let ds_type = datasource_type_of(query).unwrap_or_default();
        self.datasources.get(ds_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn parser() -> QueryParser {
        QueryParser::new(Arc::new(DataSourceRegistry::default()))
    }

    fn request(queries: Vec<Value>) -> MetricRequest {
        MetricRequest {
            from: "now-1h".to_string(),
            to: "now".to_string(),
            queries,
            debug: false,
        }
    }

    #[test]
    fn test_empty_request() {
        assert_eq!(
            parser().parse(&request(vec![])),
            Err(QueryError::NoQueriesFound)
        );
    }

    #[test]
    fn test_unknown_or_missing_datasource() {
        let unknown = request(vec![json!({"refId": "A", "datasource": {"type": "mysql"}})]);
        assert!(matches!(
            parser().parse(&unknown),
            Err(QueryError::InvalidDatasourceIdentifier { .. })
        ));

        let missing = request(vec![json!({"refId": "A"})]);
        assert!(matches!(
            parser().parse(&missing),
            Err(QueryError::InvalidDatasourceIdentifier { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let parsed = parser()
            .parse(&request(vec![json!({"datasource": {"type": "loki"}, "expr": "{job=\"x\"}"})]))
            .unwrap();

        let pq = &parsed.parsed_queries[&DataSourceType::new("loki")][0];
        assert_eq!(pq.query.ref_id, "A");
        assert_eq!(pq.query.max_data_points, 100);
        assert_eq!(pq.query.interval, Duration::from_millis(1000));
        assert_eq!(pq.query.query_type, "");
        assert_eq!(
            serde_json::from_str::<Value>(&pq.query.json).unwrap(),
            pq.raw_query
        );
        assert!(!parsed.has_expression);
    }

    #[test]
    fn test_explicit_fields() {
        let parsed = parser()
            .parse(&request(vec![json!({
                "refId": "Q",
                "datasource": "prometheus",
                "maxDataPoints": 1092,
                "intervalMs": 86400000,
                "queryType": "range"
            })]))
            .unwrap();

        let pq = &parsed.parsed_queries[&DataSourceType::new("prometheus")][0];
        assert_eq!(pq.query.ref_id, "Q");
        assert_eq!(pq.query.max_data_points, 1092);
        assert_eq!(pq.query.interval, Duration::from_millis(86_400_000));
        assert_eq!(pq.query.query_type, "range");
        assert_eq!(pq.datasource.as_ref().unwrap().ds_type.as_str(), "prometheus");
    }

    #[test]
    fn test_grouping_preserves_caller_order() {
        let parsed = parser()
            .parse(&request(vec![
                json!({"refId": "A", "datasource": {"type": "loki"}}),
                json!({"refId": "B", "datasource": {"type": "prometheus"}}),
                json!({"refId": "C", "datasource": {"type": "loki"}}),
            ]))
            .unwrap();

        assert_eq!(parsed.ds_types.len(), 2);
        let loki: Vec<_> = parsed.parsed_queries[&DataSourceType::new("loki")]
            .iter()
            .map(|pq| pq.query.ref_id.as_str())
            .collect();
        assert_eq!(loki, vec!["A", "C"]);

        for (ds_type, group) in &parsed.parsed_queries {
            for pq in group {
                assert_eq!(&pq.datasource.as_ref().unwrap().ds_type, ds_type);
            }
        }
        assert_eq!(parsed.flattened_queries().count(), 3);
    }

    #[test]
    fn test_shared_time_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
        let req = MetricRequest {
            from: "now".to_string(),
            to: "now".to_string(),
            queries: vec![
                json!({"refId": "A", "datasource": {"type": "loki"}}),
                json!({"refId": "B", "datasource": {"type": "prometheus"}}),
            ],
            debug: false,
        };
        let parsed = parser()
            .parse_with_range(&req, &DataTimeRange::with_now(&req.from, &req.to, now))
            .unwrap();

        for pq in parsed.flattened_queries() {
            assert_eq!(pq.query.time_range.from, now);
            assert_eq!(pq.query.time_range.to, now);
        }
    }

    #[test]
    fn test_expression_flag() {
        let parsed = parser()
            .parse(&request(vec![
                json!({"refId": "A", "datasource": {"type": "prometheus"}}),
                json!({"refId": "B", "datasource": {"type": "__expr__"}, "expression": "$A * 2"}),
            ]))
            .unwrap();
        assert!(parsed.has_expression);
    }

    #[test]
    fn test_duplicate_ref_id() {
        let result = parser().parse(&request(vec![
            json!({"refId": "A", "datasource": {"type": "loki"}}),
            json!({"refId": "A", "datasource": {"type": "prometheus"}}),
        ]));
        assert_eq!(
            result,
            Err(QueryError::DuplicateRefId {
                ref_id: "A".to_string()
            })
        );
    }
}
