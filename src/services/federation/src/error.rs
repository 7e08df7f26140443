//! Error types for the query federation service
//!
//! Every error carries a machine-readable message id and a caller-safe public
//! message that is distinct from the internal detail rendered by `Display`.

use thiserror::Error;

/// Errors raised by the plugin layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// No plugin is registered under the requested id
    #[error("plugin not registered")]
    PluginNotRegistered,

    /// The plugin entry exists but has no bound backend client
    #[error("plugin unavailable")]
    PluginUnavailable,

    /// The backend client exists but does not implement the capability
    #[error("method not implemented")]
    MethodNotImplemented,

    /// Starting the plugin failed
    #[error("could not start plugin {plugin_id}: {reason}")]
    StartFailed { plugin_id: String, reason: String },

    /// Error reported by the provider behind the plugin
    #[error("{0}")]
    Backend(String),
}

impl PluginError {
    /// Machine-readable identifier
    pub fn message_id(&self) -> &'static str {
        match self {
            PluginError::PluginNotRegistered => "plugin.notRegistered",
            PluginError::PluginUnavailable => "plugin.unavailable",
            PluginError::MethodNotImplemented => "plugin.notImplemented",
            PluginError::StartFailed { .. } => "plugin.startFailed",
            PluginError::Backend(_) => "plugin.downstreamError",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PluginError::PluginNotRegistered => 404,
            PluginError::MethodNotImplemented => 501,
            PluginError::PluginUnavailable => 503,
            PluginError::StartFailed { .. } => 500,
            PluginError::Backend(_) => 500,
        }
    }
}

/// Errors raised while parsing or dispatching a query request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The request carried no queries
    #[error("no queries found")]
    NoQueriesFound,

    /// A query targets an unknown or missing datasource type
    #[error("invalid datasource identifier: {identifier:?}")]
    InvalidDatasourceIdentifier { identifier: String },

    /// A query routed to the expression pipeline has no datasource attached
    #[error("query missing datasources info: {ref_id}")]
    MissingDataSourceInfo { ref_id: String },

    /// Two queries in one request share a RefID
    #[error("multiple queries using the same RefId is not allowed: {ref_id}")]
    DuplicateRefId { ref_id: String },

    /// A request needed the expression pipeline but none is configured
    #[error("expression pipeline is not configured")]
    ExpressionsUnavailable,

    /// The expression pipeline failed
    #[error("expression request error: {0}")]
    Expression(String),

    /// The request was cancelled before dispatch completed
    #[error("query dispatch cancelled")]
    Cancelled,

    /// Plugin layer failure
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Unexpected internal failure
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl QueryError {
    /// Machine-readable identifier
    pub fn message_id(&self) -> &'static str {
        match self {
            QueryError::NoQueriesFound => "query.noQueries",
            QueryError::InvalidDatasourceIdentifier { .. } => "query.invalidDatasourceId",
            QueryError::MissingDataSourceInfo { .. } => "query.missingDataSourceInfo",
            QueryError::DuplicateRefId { .. } => "query.duplicateRefId",
            QueryError::ExpressionsUnavailable => "query.expressionsUnavailable",
            QueryError::Expression(_) => "sse.dataQueryError",
            QueryError::Cancelled => "query.cancelled",
            QueryError::Plugin(e) => e.message_id(),
            QueryError::Internal { .. } => "query.internal",
        }
    }

    /// Message that is safe to show to the caller
    pub fn public_message(&self) -> String {
        match self {
            QueryError::NoQueriesFound => "No queries found".to_string(),
            QueryError::InvalidDatasourceIdentifier { .. } => {
                "Query does not contain a valid datasource identifier".to_string()
            }
            QueryError::MissingDataSourceInfo { ref_id } => {
                format!("Query {} is missing datasources information", ref_id)
            }
            QueryError::DuplicateRefId { .. } => {
                "Multiple queries using the same RefId is not allowed".to_string()
            }
            QueryError::ExpressionsUnavailable => "Expressions are not supported".to_string(),
            QueryError::Cancelled => "Query was cancelled".to_string(),
            QueryError::Plugin(PluginError::PluginNotRegistered) => "Plugin not found".to_string(),
            QueryError::Plugin(PluginError::PluginUnavailable) => {
                "Plugin unavailable".to_string()
            }
            QueryError::Plugin(PluginError::MethodNotImplemented) => {
                "Method not implemented".to_string()
            }
            _ => "Query data error".to_string(),
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::NoQueriesFound
            | QueryError::InvalidDatasourceIdentifier { .. }
            | QueryError::MissingDataSourceInfo { .. }
            | QueryError::DuplicateRefId { .. }
            | QueryError::Expression(_) => 400,
            QueryError::ExpressionsUnavailable => 501,
            QueryError::Cancelled => 499,
            QueryError::Plugin(e) => e.status_code(),
            QueryError::Internal { .. } => 500,
        }
    }

    /// Whether the error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_message_hides_detail() {
        let err = QueryError::InvalidDatasourceIdentifier {
            identifier: "secret-backend".to_string(),
        };
        assert!(err.to_string().contains("secret-backend"));
        assert!(!err.public_message().contains("secret-backend"));
        assert_eq!(err.message_id(), "query.invalidDatasourceId");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_plugin_error_status_codes() {
        assert_eq!(QueryError::from(PluginError::PluginNotRegistered).status_code(), 404);
        assert_eq!(PluginError::PluginUnavailable.status_code(), 503);
        assert_eq!(PluginError::MethodNotImplemented.status_code(), 501);
        assert_eq!(
            QueryError::Internal {
                message: "boom".to_string()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_plugin_errors_are_distinct() {
        assert_ne!(PluginError::PluginUnavailable, PluginError::MethodNotImplemented);
        assert_ne!(
            PluginError::PluginUnavailable.message_id(),
            PluginError::MethodNotImplemented.message_id()
        );
    }
}
