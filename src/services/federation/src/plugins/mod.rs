//! Plugin facade
//!
//! A [`Plugin`] is a registered provider entry: an identifier, an optional
//! signature and an optional bound backend client. Capability calls delegate to
//! the client and fail with `PluginUnavailable` when none is bound. Lifecycle
//! transitions are serialized per plugin.

pub mod backend;
pub mod client;
pub mod core_plugin;
pub mod store;

pub use backend::{
    BackendPlugin, CallResourceHandler, CheckHealthHandler, CollectMetricsHandler,
    PluginFactoryFunc, QueryDataHandler, ServeOpts, StreamHandler, Target,
};
pub use client::PluginClient;
pub use core_plugin::CorePlugin;
pub use store::{InMemoryStore, PluginStore};

use crate::error::PluginError;
use crate::models::{
    CallResourceRequest, CallResourceResponse, CheckHealthRequest, CheckHealthResult,
    CollectMetricsRequest, CollectMetricsResult, PublishStreamRequest, PublishStreamResponse,
    QueryDataRequest, QueryDataResponse, RunStreamRequest, StreamSender, SubscribeStreamRequest,
    SubscribeStreamResponse,
};
use crate::request_context::RequestContext;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug)]
pub struct Plugin {
    pub id: String,
    pub signature: Option<String>,
    backend_client: Option<Arc<dyn BackendPlugin>>,
    lifecycle: Mutex<()>,
}

impl Plugin {
    /// Plugin entry without a bound client
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            signature: None,
            backend_client: None,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_client(mut self, client: Arc<dyn BackendPlugin>) -> Self {
        self.backend_client = Some(client);
        self
    }

    /// The bound backend client, if any
    pub fn client(&self) -> Option<&Arc<dyn BackendPlugin>> {
        self.backend_client.as_ref()
    }

    fn bound_client(&self) -> Result<&Arc<dyn BackendPlugin>, PluginError> {
        self.backend_client
            .as_ref()
            .ok_or(PluginError::PluginUnavailable)
    }

    // ============================================================================================
    // Lifecycle
    // ============================================================================================

    pub async fn start(&self) -> Result<(), PluginError> {
        let _guard = self.lifecycle.lock().await;

        let client = self
            .backend_client
            .as_ref()
            .ok_or_else(|| PluginError::StartFailed {
                plugin_id: self.id.clone(),
                reason: "no plugin backend client exists".to_string(),
            })?;

        client.start().await?;
        info!(plugin_id = %self.id, "plugin started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), PluginError> {
        let _guard = self.lifecycle.lock().await;

        match &self.backend_client {
            Some(client) => {
                client.stop().await?;
                info!(plugin_id = %self.id, "plugin stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub async fn decommission(&self) -> Result<(), PluginError> {
        let _guard = self.lifecycle.lock().await;

        match &self.backend_client {
            Some(client) => client.decommission(),
            None => Ok(()),
        }
    }

    pub fn is_managed(&self) -> bool {
        self.backend_client
            .as_ref()
            .is_some_and(|client| client.is_managed())
    }

    pub fn is_decommissioned(&self) -> bool {
        self.backend_client
            .as_ref()
            .is_some_and(|client| client.is_decommissioned())
    }

    pub fn exited(&self) -> bool {
        self.backend_client
            .as_ref()
            .is_some_and(|client| client.exited())
    }

    pub fn target(&self) -> Target {
        self.backend_client
            .as_ref()
            .map_or(Target::Unknown, |client| client.target())
    }

    // ============================================================================================
    // Capabilities
    // ============================================================================================

    pub async fn query_data(
        &self,
        ctx: &RequestContext,
        req: QueryDataRequest,
    ) -> Result<QueryDataResponse, PluginError> {
        self.bound_client()?.query_data(ctx, req).await
    }

    pub async fn call_resource(
        &self,
        ctx: &RequestContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, PluginError> {
        self.bound_client()?.call_resource(ctx, req).await
    }

    pub async fn check_health(
        &self,
        ctx: &RequestContext,
        req: CheckHealthRequest,
    ) -> Result<CheckHealthResult, PluginError> {
        self.bound_client()?.check_health(ctx, req).await
    }

    pub async fn collect_metrics(
        &self,
        ctx: &RequestContext,
        req: CollectMetricsRequest,
    ) -> Result<CollectMetricsResult, PluginError> {
        self.bound_client()?.collect_metrics(ctx, req).await
    }

    pub async fn subscribe_stream(
        &self,
        ctx: &RequestContext,
        req: SubscribeStreamRequest,
    ) -> Result<SubscribeStreamResponse, PluginError> {
        self.bound_client()?.subscribe_stream(ctx, req).await
    }

    pub async fn publish_stream(
        &self,
        ctx: &RequestContext,
        req: PublishStreamRequest,
    ) -> Result<PublishStreamResponse, PluginError> {
        self.bound_client()?.publish_stream(ctx, req).await
    }

    pub async fn run_stream(
        &self,
        ctx: &RequestContext,
        req: RunStreamRequest,
        sender: StreamSender,
    ) -> Result<(), PluginError> {
        self.bound_client()?.run_stream(ctx, req, sender).await
    }
}
