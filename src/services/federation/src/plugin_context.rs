//! Plugin context resolution
//!
//! Builds the [`PluginContext`] that scopes exactly one capability call to one
//! plugin and, optionally, one data source instance. Contexts are built fresh
//! for every call and never cached.

use crate::datasources::{DataSource, DataSourceType};
use crate::error::PluginError;
use crate::models::{DataSourceInstanceSettings, PluginContext};
use crate::plugins::PluginStore;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PluginContextProvider {
    plugin_store: Arc<dyn PluginStore>,
}

impl PluginContextProvider {
    pub fn new(plugin_store: Arc<dyn PluginStore>) -> Self {
        Self { plugin_store }
    }

    /// Context for a plugin without data source instance settings
    pub fn get(
        &self,
        plugin_type: &DataSourceType,
        org_id: i64,
    ) -> Result<PluginContext, PluginError> {
        let plugin = self
            .plugin_store
            .plugin(plugin_type.as_str())
            .ok_or(PluginError::PluginNotRegistered)?;

        Ok(PluginContext {
            plugin_id: plugin.id.clone(),
            org_id,
            data_source_instance_settings: None,
        })
    }

    /// Context for a plugin with the instance settings of `ds` attached
    pub fn get_with_data_source(
        &self,
        plugin_type: &DataSourceType,
        ds: &DataSource,
    ) -> Result<PluginContext, PluginError> {
        let plugin = self
            .plugin_store
            .plugin(plugin_type.as_str())
            .ok_or(PluginError::PluginNotRegistered)?;

        let name = ds.ds_type.to_string();
        Ok(PluginContext {
            plugin_id: plugin.id.clone(),
            org_id: 0,
            data_source_instance_settings: Some(DataSourceInstanceSettings {
                ds_type: name.clone(),
                name: name.clone(),
                url: ds.url.clone(),
                uid: name,
                json_data: serde_json::json!({}),
            }),
        })
    }
}
