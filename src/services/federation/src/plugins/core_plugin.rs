//! In-process backend plugin
//!
//! Wraps the handlers named in a [`ServeOpts`] behind the [`BackendPlugin`]
//! surface. Capabilities the provider did not offer answer
//! `MethodNotImplemented`.

use super::backend::{
    BackendPlugin, CallResourceHandler, CheckHealthHandler, CollectMetricsHandler,
    PluginFactoryFunc, QueryDataHandler, ServeOpts, StreamHandler, Target,
};
use crate::error::PluginError;
use crate::models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    CollectMetricsRequest, CollectMetricsResult, PublishStreamRequest, PublishStreamResponse,
    QueryDataRequest, QueryDataResponse, RunStreamRequest, StreamSender, SubscribeStreamRequest,
    SubscribeStreamResponse,
};
use crate::request_context::RequestContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct CorePlugin {
    plugin_id: String,
    opts: ServeOpts,
    decommissioned: AtomicBool,
}

impl CorePlugin {
    pub fn new(plugin_id: impl Into<String>, opts: ServeOpts) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            opts,
            decommissioned: AtomicBool::new(false),
        }
    }

    /// Factory producing core plugins backed by `opts`
    pub fn factory(opts: ServeOpts) -> PluginFactoryFunc {
        Box::new(move |plugin_id: &str| {
            Ok(Arc::new(CorePlugin::new(plugin_id, opts.clone())) as Arc<dyn BackendPlugin>)
        })
    }
}

#[async_trait]
impl BackendPlugin for CorePlugin {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    async fn start(&self) -> Result<(), PluginError> {
        debug!(plugin_id = %self.plugin_id, "starting core plugin");
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        debug!(plugin_id = %self.plugin_id, "stopping core plugin");
        Ok(())
    }

    fn is_managed(&self) -> bool {
        true
    }

    fn exited(&self) -> bool {
        false
    }

    fn decommission(&self) -> Result<(), PluginError> {
        self.decommissioned.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_decommissioned(&self) -> bool {
        self.decommissioned.load(Ordering::SeqCst)
    }

    fn target(&self) -> Target {
        Target::InMemory
    }
}

#[async_trait]
impl QueryDataHandler for CorePlugin {
    async fn query_data(
        &self,
        ctx: &RequestContext,
        req: QueryDataRequest,
    ) -> Result<QueryDataResponse, PluginError> {
        match &self.opts.query_data_handler {
            Some(handler) => handler.query_data(ctx, req).await,
            None => Err(PluginError::MethodNotImplemented),
        }
    }
}

#[async_trait]
impl CallResourceHandler for CorePlugin {
    async fn call_resource(
        &self,
        ctx: &RequestContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, PluginError> {
        match &self.opts.call_resource_handler {
            Some(handler) => handler.call_resource(ctx, req).await,
            None => Err(PluginError::MethodNotImplemented),
        }
    }
}

#[async_trait]
impl CheckHealthHandler for CorePlugin {
    async fn check_health(
        &self,
        ctx: &RequestContext,
        req: CheckHealthRequest,
    ) -> Result<CheckHealthResult, PluginError> {
        match &self.opts.check_health_handler {
            Some(handler) => handler.check_health(ctx, req).await,
            None => Err(PluginError::MethodNotImplemented),
        }
    }
}

#[async_trait]
impl CollectMetricsHandler for CorePlugin {
    async fn collect_metrics(
        &self,
        _ctx: &RequestContext,
        _req: CollectMetricsRequest,
    ) -> Result<CollectMetricsResult, PluginError> {
        Err(PluginError::MethodNotImplemented)
    }
}

#[async_trait]
impl StreamHandler for CorePlugin {
    async fn subscribe_stream(
        &self,
        ctx: &RequestContext,
        req: SubscribeStreamRequest,
    ) -> Result<SubscribeStreamResponse, PluginError> {
        match &self.opts.stream_handler {
            Some(handler) => handler.subscribe_stream(ctx, req).await,
            None => Err(PluginError::MethodNotImplemented),
        }
    }

    async fn publish_stream(
        &self,
        ctx: &RequestContext,
        req: PublishStreamRequest,
    ) -> Result<PublishStreamResponse, PluginError> {
        match &self.opts.stream_handler {
            Some(handler) => handler.publish_stream(ctx, req).await,
            None => Err(PluginError::MethodNotImplemented),
        }
    }

    async fn run_stream(
        &self,
        ctx: &RequestContext,
        req: RunStreamRequest,
        sender: StreamSender,
    ) -> Result<(), PluginError> {
        match &self.opts.stream_handler {
            Some(handler) => handler.run_stream(ctx, req, sender).await,
            None => Err(PluginError::MethodNotImplemented),
        }
    }
}
