//! Expression pipeline boundary
//!
//! Requests containing expression queries are handed, whole, to an
//! [`ExpressionService`]. The pipeline itself lives outside this crate.

use crate::datasources::DataSource;
use crate::models::{QueryDataResponse, TimeRange};
use crate::request_context::RequestContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One query as seen by the expression pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ExprQuery {
    pub ref_id: String,
    pub query_type: String,
    pub max_data_points: i64,
    pub interval: Duration,
    pub time_range: TimeRange,
    pub json: String,
    pub data_source: DataSource,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprRequest {
    pub headers: std::collections::HashMap<String, String>,
    pub queries: Vec<ExprQuery>,
}

#[async_trait]
pub trait ExpressionService: Send + Sync + std::fmt::Debug {
    /// Evaluate the queries of `req`. Time ranges are already absolute; `now`
    /// is only informational.
    async fn transform_data(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
        req: ExprRequest,
    ) -> anyhow::Result<QueryDataResponse>;
}
