//! Federation dispatcher
//!
//! Requests that target a single provider type are forwarded to that provider
//! directly. Requests spanning several types are split per type and each part
//! is dispatched concurrently through the same entry point, with failures and
//! panics of one part contained to the RefIDs of that part.

use crate::datasources::DataSourceType;
use crate::error::{QueryError, Result};
use crate::expr::{ExprQuery, ExprRequest, ExpressionService};
use crate::models::{DataResponse, MetricRequest, QueryDataRequest, QueryDataResponse};
use crate::parser::{ParsedQuery, ParsedRequest, QueryParser};
use crate::plugin_context::PluginContextProvider;
use crate::plugins::PluginClient;
use crate::request_context::RequestContext;
use crate::time_range::DataTimeRange;
use chrono::{FixedOffset, Weekday};
use futures::future::{BoxFuture, FutureExt};
use http::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Results of one provider group together with the headers its dispatch set
#[derive(Debug, Default)]
struct SplitResponse {
    responses: BTreeMap<String, DataResponse>,
    headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub struct QueryService {
    parser: QueryParser,
    context_provider: PluginContextProvider,
    plugin_client: PluginClient,
    expressions: Option<Arc<dyn ExpressionService>>,
    concurrent_query_limit: usize,
    location: Option<FixedOffset>,
    week_start: Option<Weekday>,
}

impl QueryService {
    pub fn new(
        parser: QueryParser,
        context_provider: PluginContextProvider,
        plugin_client: PluginClient,
        concurrent_query_limit: usize,
    ) -> Self {
        Self {
            parser,
            context_provider,
            plugin_client,
            expressions: None,
            concurrent_query_limit: concurrent_query_limit.max(1),
            location: None,
            week_start: None,
        }
    }

    /// Evaluate date math in a fixed offset and with a custom start of week
    pub fn with_time_settings(
        mut self,
        location: Option<FixedOffset>,
        week_start: Option<Weekday>,
    ) -> Self {
        self.location = location;
        self.week_start = week_start;
        self
    }

    pub fn with_expressions(mut self, expressions: Arc<dyn ExpressionService>) -> Self {
        self.expressions = Some(expressions);
        self
    }

    pub fn concurrent_query_limit(&self) -> usize {
        self.concurrent_query_limit
    }

    /// Execute every query of `req` and return one result per RefID.
    ///
    /// Only parse failures, a missing expression pipeline and cancellation
    /// surface as errors; provider failures in a multi-provider request are
    /// reported per RefID instead.
    pub fn query_data(
        &self,
        ctx: RequestContext,
        req: MetricRequest,
    ) -> BoxFuture<'static, Result<QueryDataResponse>> {
        let mut time_range = DataTimeRange::new(&req.from, &req.to);
        if let Some(location) = self.location {
            time_range = time_range.with_location(location);
        }
        if let Some(week_start) = self.week_start {
            time_range = time_range.with_week_start(week_start);
        }
        self.dispatch(ctx, req, time_range)
    }

    fn dispatch(
        &self,
        ctx: RequestContext,
        req: MetricRequest,
        time_range: DataTimeRange,
    ) -> BoxFuture<'static, Result<QueryDataResponse>> {
        let svc = self.clone();
        async move {
            let parsed = svc.parser.parse_with_range(&req, &time_range)?;

            if parsed.has_expression {
                return svc.handle_expressions(&ctx, &parsed, &time_range).await;
            }

            if parsed.ds_types.len() == 1 {
                return svc.handle_query_data(&ctx, &parsed).await;
            }

            svc.execute_concurrent_queries(&ctx, &req, parsed, &time_range)
                .await
        }
        .boxed()
    }

    // ============================================================================================
    // Single provider
    // ============================================================================================

    async fn handle_query_data(
        &self,
        ctx: &RequestContext,
        parsed: &ParsedRequest,
    ) -> Result<QueryDataResponse> {
        let (ds_type, queries) = parsed
            .parsed_queries
            .iter()
            .next()
            .ok_or(QueryError::NoQueriesFound)?;

        let mut plugin_context = match queries.first().and_then(|pq| pq.datasource.as_ref()) {
            Some(ds) => self.context_provider.get_with_data_source(ds_type, ds)?,
            None => self.context_provider.get(ds_type, ctx.org_id())?,
        };
        plugin_context.org_id = ctx.org_id();

        let req = QueryDataRequest {
            plugin_context,
            headers: ctx.request_headers().clone(),
            queries: queries.iter().map(|pq| pq.query.clone()).collect(),
        };

        debug!(
            datasource = %ds_type,
            queries = req.queries.len(),
            "querying single datasource"
        );
        Ok(self.plugin_client.query_data(ctx, req).await?)
    }

    // ============================================================================================
    // Scatter-gather
    // ============================================================================================

    async fn execute_concurrent_queries(
        &self,
        ctx: &RequestContext,
        req: &MetricRequest,
        parsed: ParsedRequest,
        time_range: &DataTimeRange,
    ) -> Result<QueryDataResponse> {
        if ctx.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let groups = parsed.parsed_queries.len();
        info!(
            groups,
            limit = self.concurrent_query_limit,
            "executing queries across datasources concurrently"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrent_query_limit));
        let (tx, mut rx) = mpsc::channel::<SplitResponse>(groups.max(1));
        let mut units = JoinSet::new();

        for (ds_type, queries) in parsed.parsed_queries {
            let sub_req =
                req.clone_with_queries(queries.iter().map(|pq| pq.raw_query.clone()).collect());
            let unit = self.clone();
            let unit_ctx = ctx.copy();
            let semaphore = Arc::clone(&semaphore);
            let time_range = time_range.clone();
            let tx = tx.clone();

            units.spawn(async move {
                let token = unit_ctx.cancellation_token().clone();
                let _permit = tokio::select! {
                    _ = token.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let sub_ctx = unit_ctx.clone();
                let mut inner =
                    tokio::spawn(async move { unit.dispatch(sub_ctx, sub_req, time_range).await });

                let result = tokio::select! {
                    _ = token.cancelled() => {
                        inner.abort();
                        return;
                    }
                    joined = &mut inner => joined.unwrap_or_else(|e| Err(panic_to_error(&ds_type, e))),
                };

                let split = match result {
                    Ok(resp) => SplitResponse {
                        responses: resp.responses,
                        headers: unit_ctx.response_headers(),
                    },
                    Err(err) => {
                        warn!(datasource = %ds_type, error = %err, "datasource query failed");
                        SplitResponse {
                            responses: build_error_responses(&err, &queries),
                            headers: HeaderMap::new(),
                        }
                    }
                };

                if tx.send(split).await.is_err() {
                    debug!(datasource = %ds_type, "result receiver dropped");
                }
            });
        }
        drop(tx);

        let cancellation = ctx.cancellation_token().clone();
        let cancelled = tokio::select! {
            _ = cancellation.cancelled() => true,
            _ = wait_for_units(&mut units) => false,
        };
        if cancelled {
            units.abort_all();
            warn!("query dispatch cancelled");
            return Err(QueryError::Cancelled);
        }

        let mut resp = QueryDataResponse::new();
        while let Some(split) = rx.recv().await {
            resp.responses.extend(split.responses);
            ctx.merge_response_headers(&split.headers);
        }
        Ok(resp)
    }

    // ============================================================================================
    // Expressions
    // ============================================================================================

    async fn handle_expressions(
        &self,
        ctx: &RequestContext,
        parsed: &ParsedRequest,
        time_range: &DataTimeRange,
    ) -> Result<QueryDataResponse> {
        let expressions = self
            .expressions
            .as_ref()
            .ok_or(QueryError::ExpressionsUnavailable)?;

        let queries = parsed
            .flattened_queries()
            .map(|pq| {
                let data_source =
                    pq.datasource
                        .clone()
                        .ok_or_else(|| QueryError::MissingDataSourceInfo {
                            ref_id: pq.query.ref_id.clone(),
                        })?;
                Ok(ExprQuery {
                    ref_id: pq.query.ref_id.clone(),
                    query_type: pq.query.query_type.clone(),
                    max_data_points: pq.query.max_data_points,
                    interval: pq.query.interval,
                    time_range: pq.query.time_range,
                    json: pq.query.json.clone(),
                    data_source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let req = ExprRequest {
            headers: ctx.request_headers().clone(),
            queries,
        };

        expressions
            .transform_data(ctx, time_range.now, req)
            .await
            .map_err(|e| QueryError::Expression(format!("{:#}", e)))
    }
}

async fn wait_for_units(units: &mut JoinSet<()>) {
    while let Some(joined) = units.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "query unit panicked");
            }
        }
    }
}

/// The same error result for every RefID of a provider group
fn build_error_responses(
    err: &QueryError,
    queries: &[ParsedQuery],
) -> BTreeMap<String, DataResponse> {
    let message = err.to_string();
    queries
        .iter()
        .map(|pq| (pq.query.ref_id.clone(), DataResponse::error(message.clone())))
        .collect()
}

fn panic_to_error(ds_type: &DataSourceType, err: JoinError) -> QueryError {
    if !err.is_panic() {
        return QueryError::Internal {
            message: err.to_string(),
        };
    }

    let payload = err.into_panic();
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected error".to_string()
    };
    error!(datasource = %ds_type, error = %message, "query datasource panic");
    QueryError::Internal { message }
}
