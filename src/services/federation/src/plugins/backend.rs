//! Backend plugin capability traits
//!
//! A provider implements any subset of the handler traits. [`ServeOpts`] names
//! which handlers a provider offers, and a [`BackendPlugin`] exposes all of them
//! uniformly, answering `MethodNotImplemented` for the ones it lacks.

use crate::error::PluginError;
use crate::models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    CollectMetricsRequest, CollectMetricsResult, PublishStreamRequest, PublishStreamResponse,
    QueryDataRequest, QueryDataResponse, RunStreamRequest, StreamSender, SubscribeStreamRequest,
    SubscribeStreamResponse,
};
use crate::request_context::RequestContext;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait QueryDataHandler: Send + Sync {
    async fn query_data(
        &self,
        ctx: &RequestContext,
        req: QueryDataRequest,
    ) -> Result<QueryDataResponse, PluginError>;
}

#[async_trait]
pub trait CallResourceHandler: Send + Sync {
    async fn call_resource(
        &self,
        ctx: &RequestContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, PluginError>;
}

#[async_trait]
pub trait CheckHealthHandler: Send + Sync {
    async fn check_health(
        &self,
        ctx: &RequestContext,
        req: CheckHealthRequest,
    ) -> Result<CheckHealthResult, PluginError>;
}

#[async_trait]
pub trait CollectMetricsHandler: Send + Sync {
    async fn collect_metrics(
        &self,
        ctx: &RequestContext,
        req: CollectMetricsRequest,
    ) -> Result<CollectMetricsResult, PluginError>;
}

#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn subscribe_stream(
        &self,
        ctx: &RequestContext,
        req: SubscribeStreamRequest,
    ) -> Result<SubscribeStreamResponse, PluginError>;

    async fn publish_stream(
        &self,
        ctx: &RequestContext,
        req: PublishStreamRequest,
    ) -> Result<PublishStreamResponse, PluginError>;

    async fn run_stream(
        &self,
        ctx: &RequestContext,
        req: RunStreamRequest,
        sender: StreamSender,
    ) -> Result<(), PluginError>;
}

/// Where a plugin executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    None,
    Unknown,
    InMemory,
    Local,
}

/// Uniform capability surface plus lifecycle of one provider
#[async_trait]
pub trait BackendPlugin:
    QueryDataHandler
    + CallResourceHandler
    + CheckHealthHandler
    + CollectMetricsHandler
    + StreamHandler
    + fmt::Debug
{
    fn plugin_id(&self) -> &str;

    async fn start(&self) -> Result<(), PluginError>;

    async fn stop(&self) -> Result<(), PluginError>;

    fn is_managed(&self) -> bool;

    fn exited(&self) -> bool;

    fn decommission(&self) -> Result<(), PluginError>;

    fn is_decommissioned(&self) -> bool;

    fn target(&self) -> Target;
}

/// Builds a backend plugin for a plugin id
pub type PluginFactoryFunc =
    Box<dyn Fn(&str) -> Result<Arc<dyn BackendPlugin>, PluginError> + Send + Sync>;

/// Explicit capability set of a provider
#[derive(Clone, Default)]
pub struct ServeOpts {
    pub query_data_handler: Option<Arc<dyn QueryDataHandler>>,
    pub call_resource_handler: Option<Arc<dyn CallResourceHandler>>,
    pub check_health_handler: Option<Arc<dyn CheckHealthHandler>>,
    pub stream_handler: Option<Arc<dyn StreamHandler>>,
}

impl ServeOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_data(mut self, handler: Arc<dyn QueryDataHandler>) -> Self {
        self.query_data_handler = Some(handler);
        self
    }

    pub fn with_call_resource(mut self, handler: Arc<dyn CallResourceHandler>) -> Self {
        self.call_resource_handler = Some(handler);
        self
    }

    pub fn with_check_health(mut self, handler: Arc<dyn CheckHealthHandler>) -> Self {
        self.check_health_handler = Some(handler);
        self
    }

    pub fn with_stream(mut self, handler: Arc<dyn StreamHandler>) -> Self {
        self.stream_handler = Some(handler);
        self
    }

    /// True when the provider offers no capability at all
    pub fn is_empty(&self) -> bool {
        self.query_data_handler.is_none()
            && self.call_resource_handler.is_none()
            && self.check_health_handler.is_none()
            && self.stream_handler.is_none()
    }
}

impl fmt::Debug for ServeOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeOpts")
            .field("query_data", &self.query_data_handler.is_some())
            .field("call_resource", &self.call_resource_handler.is_some())
            .field("check_health", &self.check_health_handler.is_some())
            .field("stream", &self.stream_handler.is_some())
            .finish()
    }
}
