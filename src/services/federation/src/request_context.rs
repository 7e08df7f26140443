//! Request-scoped context
//!
//! Carries the cancellation signal, inbound request headers and the response
//! headers a single call accumulates. Concurrent sub-dispatches each work on
//! their own [`RequestContext::copy`] so no header map is shared between them.

use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
    org_id: i64,
    request_headers: Arc<HashMap<String, String>>,
    response_headers: Arc<Mutex<HeaderMap>>,
    downstream_error: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_org_id(mut self, org_id: i64) -> Self {
        self.org_id = org_id;
        self
    }

    pub fn with_request_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.request_headers = Arc::new(headers);
        self
    }

    /// Copy for a concurrent sub-call.
    ///
    /// The copy observes this context's cancellation and shares its read-only
    /// request data, but starts with an empty response header map of its own.
    pub fn copy(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            org_id: self.org_id,
            request_headers: Arc::clone(&self.request_headers),
            response_headers: Arc::new(Mutex::new(HeaderMap::new())),
            downstream_error: Arc::clone(&self.downstream_error),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn org_id(&self) -> i64 {
        self.org_id
    }

    pub fn request_headers(&self) -> &HashMap<String, String> {
        &self.request_headers
    }

    /// Append a response header value
    pub fn append_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_headers.lock().append(name, value);
    }

    /// Snapshot of the response headers set so far
    pub fn response_headers(&self) -> HeaderMap {
        self.response_headers.lock().clone()
    }

    /// Merge headers value by value, skipping values already present.
    ///
    /// Returns the number of skipped duplicates.
    pub fn merge_response_headers(&self, headers: &HeaderMap) -> usize {
        let mut skipped = 0;
        let mut own = self.response_headers.lock();
        for (name, value) in headers {
            if own.get_all(name).iter().any(|existing| existing == value) {
                warn!(header = %name, value = ?value, "skipped duplicate response header");
                skipped += 1;
            } else {
                own.append(name.clone(), value.clone());
            }
        }
        skipped
    }

    /// Mark that the response carries errors caused downstream of this service
    pub fn mark_downstream_error(&self) {
        self.downstream_error.store(true, Ordering::Relaxed);
    }

    pub fn is_downstream_error(&self) -> bool {
        self.downstream_error.load(Ordering::Relaxed)
    }
}
