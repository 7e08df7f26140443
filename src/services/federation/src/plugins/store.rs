//! Plugin registry
//!
//! Built once at startup and read concurrently by every federation call. Writes
//! only happen at registration time, under the write half of a reader/writer lock.

use super::backend::{PluginFactoryFunc, ServeOpts};
use super::core_plugin::CorePlugin;
use super::Plugin;
use crate::error::PluginError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lookup surface of the plugin registry
pub trait PluginStore: Send + Sync + std::fmt::Debug {
    /// Find a plugin by its id
    fn plugin(&self, id: &str) -> Option<Arc<Plugin>>;

    /// All registered plugins
    fn plugins(&self) -> Vec<Arc<Plugin>>;
}

/// In-memory plugin registry
#[derive(Debug, Default)]
pub struct InMemoryStore {
    store: RwLock<HashMap<String, Arc<Plugin>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin entry, replacing any previous entry with the same id
    pub fn register(&self, plugin: Plugin) -> Arc<Plugin> {
        let plugin = Arc::new(plugin);
        let previous = self
            .store
            .write()
            .insert(plugin.id.clone(), Arc::clone(&plugin));

        if previous.is_some() {
            warn!(plugin_id = %plugin.id, "replaced existing plugin registration");
        } else {
            info!(plugin_id = %plugin.id, target = ?plugin.target(), "registered plugin");
        }
        plugin
    }

    /// Register a provider by the capabilities it offers.
    ///
    /// A provider offering no capability produces no entry and `None` is returned.
    pub fn register_provider(
        &self,
        id: &str,
        signature: &str,
        opts: ServeOpts,
    ) -> Result<Option<Arc<Plugin>>, PluginError> {
        let Some(factory) = as_backend_plugin(opts) else {
            warn!(plugin_id = %id, "provider offers no capabilities, skipping registration");
            return Ok(None);
        };

        let client = factory(id)?;
        let plugin = Plugin::new(id)
            .with_signature(signature)
            .with_client(client);
        Ok(Some(self.register(plugin)))
    }

    /// Whether `id` is registered under exactly that id
    pub fn is_registered(&self, id: &str) -> bool {
        self.plugin(id).is_some_and(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

impl PluginStore for InMemoryStore {
    fn plugin(&self, id: &str) -> Option<Arc<Plugin>> {
        let plugin = self.store.read().get(id).cloned();
        if plugin.is_none() {
            debug!(plugin_id = %id, "plugin not found");
        }
        plugin
    }

    fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.store.read().values().cloned().collect()
    }
}

/// Factory for an in-process plugin exposing exactly the capabilities in `opts`
pub fn as_backend_plugin(opts: ServeOpts) -> Option<PluginFactoryFunc> {
    if opts.is_empty() {
        return None;
    }
    Some(CorePlugin::factory(opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryDataRequest, QueryDataResponse};
    use crate::plugins::{QueryDataHandler, Target};
    use crate::request_context::RequestContext;
    use async_trait::async_trait;

    struct Empty;

    #[async_trait]
    impl QueryDataHandler for Empty {
        async fn query_data(
            &self,
            _ctx: &RequestContext,
            _req: QueryDataRequest,
        ) -> Result<QueryDataResponse, PluginError> {
            Ok(QueryDataResponse::new())
        }
    }

    #[test]
    fn test_lookup_unregistered_has_no_side_effects() {
        let store = InMemoryStore::new();
        assert!(store.plugin("loki").is_none());
        assert!(store.is_empty());
        assert!(!store.is_registered("loki"));
    }

    #[test]
    fn test_register_provider() {
        let store = InMemoryStore::new();
        let plugin = store
            .register_provider("loki", "loki", ServeOpts::new().with_query_data(Arc::new(Empty)))
            .unwrap()
            .unwrap();

        assert_eq!(plugin.id, "loki");
        assert_eq!(plugin.signature.as_deref(), Some("loki"));
        assert_eq!(plugin.target(), Target::InMemory);
        assert!(store.is_registered("loki"));
        assert_eq!(store.plugins().len(), 1);
    }

    #[test]
    fn test_provider_without_capabilities_is_skipped() {
        let store = InMemoryStore::new();
        let plugin = store
            .register_provider("empty", "empty", ServeOpts::new())
            .unwrap();
        assert!(plugin.is_none());
        assert!(store.plugin("empty").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_lookups() {
        let store = Arc::new(InMemoryStore::new());
        store.register(Plugin::new("loki"));
        store.register(Plugin::new("prometheus"));

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = if i % 2 == 0 { "loki" } else { "prometheus" };
                store.plugin(id).map(|p| p.id.clone())
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let expected = if i % 2 == 0 { "loki" } else { "prometheus" };
            assert_eq!(handle.await.unwrap().as_deref(), Some(expected));
        }
        assert_eq!(store.len(), 2);
    }
}
