//! Plugin client
//!
//! Routes a capability call to the registered plugin named by the call's
//! [`PluginContext`](crate::models::PluginContext).

use super::store::PluginStore;
use super::Plugin;
use crate::error::PluginError;
use crate::models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    CollectMetricsRequest, CollectMetricsResult, PublishStreamRequest, PublishStreamResponse,
    QueryDataRequest, QueryDataResponse, RunStreamRequest, StreamSender, SubscribeStreamRequest,
    SubscribeStreamResponse,
};
use crate::request_context::RequestContext;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PluginClient {
    store: Arc<dyn PluginStore>,
}

impl PluginClient {
    pub fn new(store: Arc<dyn PluginStore>) -> Self {
        Self { store }
    }

    fn plugin(&self, plugin_id: &str) -> Result<Arc<Plugin>, PluginError> {
        self.store
            .plugin(plugin_id)
            .ok_or(PluginError::PluginNotRegistered)
    }

    pub async fn query_data(
        &self,
        ctx: &RequestContext,
        req: QueryDataRequest,
    ) -> Result<QueryDataResponse, PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        debug!(
            plugin_id = %plugin.id,
            queries = req.queries.len(),
            "dispatching query data request"
        );
        plugin.query_data(ctx, req).await
    }

    pub async fn call_resource(
        &self,
        ctx: &RequestContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        debug!(plugin_id = %plugin.id, path = %req.path, "calling plugin resource");
        plugin.call_resource(ctx, req).await
    }

    pub async fn check_health(
        &self,
        ctx: &RequestContext,
        req: CheckHealthRequest,
    ) -> Result<CheckHealthResult, PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        plugin.check_health(ctx, req).await
    }

    pub async fn collect_metrics(
        &self,
        ctx: &RequestContext,
        req: CollectMetricsRequest,
    ) -> Result<CollectMetricsResult, PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        plugin.collect_metrics(ctx, req).await
    }

    pub async fn subscribe_stream(
        &self,
        ctx: &RequestContext,
        req: SubscribeStreamRequest,
    ) -> Result<SubscribeStreamResponse, PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        plugin.subscribe_stream(ctx, req).await
    }

    pub async fn publish_stream(
        &self,
        ctx: &RequestContext,
        req: PublishStreamRequest,
    ) -> Result<PublishStreamResponse, PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        plugin.publish_stream(ctx, req).await
    }

    pub async fn run_stream(
        &self,
        ctx: &RequestContext,
        req: RunStreamRequest,
        sender: StreamSender,
    ) -> Result<(), PluginError> {
        let plugin = self.plugin(&req.plugin_context.plugin_id)?;
        plugin.run_stream(ctx, req, sender).await
    }
}
