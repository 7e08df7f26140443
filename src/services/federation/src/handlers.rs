//! HTTP request handlers for the query federation service
//!
//! Organized by functional area; shared request plumbing lives here.

pub mod health;
pub mod plugins;
pub mod query;
pub mod resources;

use crate::request_context::RequestContext;
use axum::http::{header, HeaderMap};
use std::collections::HashMap;

/// Organization the request runs under
pub const ORG_ID_HEADER: &str = "x-org-id";

/// Marks a response whose errors originate downstream of this service
pub const STATUS_SOURCE_HEADER: &str = "x-status-source";

/// Organization used when the request does not name one
pub const DEFAULT_ORG_ID: i64 = 1;

/// Build the request context for an inbound HTTP request.
///
/// Credentials are never forwarded to plugins.
pub fn request_context_from_headers(headers: &HeaderMap) -> RequestContext {
    let org_id = headers
        .get(ORG_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_ORG_ID);

    let forwarded: HashMap<String, String> = headers
        .iter()
        .filter(|(name, _)| *name != header::AUTHORIZATION && *name != header::COOKIE)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    RequestContext::new()
        .with_org_id(org_id)
        .with_request_headers(forwarded)
}
