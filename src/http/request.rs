//! Request model.
//!
//! # Responsibilities
//! - Wrap the standard request (method, URI, headers, buffered body)
//! - Carry route params and the effective pathname once a route matched
//! - Thread a shared "response defaults" handle through the middleware chain
//!
//! # Design Decisions
//! - Body is buffered once (`Bytes`) so auth candidates can each get a copy
//! - Response defaults are shared between clones of one request; `fork()`
//!   gives an isolated copy for speculative work

use std::sync::{Arc, Mutex, PoisonError};

use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::http::response::{Reply, ReplyBody};
use crate::routing::{ParamValue, Params};

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Partial response accumulated by middleware and merged under replies.
#[derive(Debug, Clone, Default)]
pub struct ResponseDefaults(Arc<Mutex<Reply>>);

impl ResponseDefaults {
    fn with<T>(&self, f: impl FnOnce(&mut Reply) -> T) -> T {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Set a header, replacing any earlier default of the same name.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.with(|r| {
            r.headers.insert(name, value);
        });
    }

    pub fn set_status(&self, status: axum::http::StatusCode) {
        self.with(|r| r.status = Some(status));
    }

    pub fn set_body(&self, body: ReplyBody) {
        self.with(|r| r.body = Some(body));
    }

    /// Merge a partial reply into the defaults (later wins).
    pub fn apply(&self, partial: Reply) {
        self.with(|r| *r = Reply::merge(r, partial));
    }

    pub fn snapshot(&self) -> Reply {
        self.with(|r| r.clone())
    }

    /// Merge `reply` over the accumulated defaults.
    pub fn merge_under(&self, reply: Reply) -> Reply {
        self.with(|base| {
            if base.is_empty() {
                reply
            } else {
                Reply::merge(base, reply)
            }
        })
    }

    fn detached(&self) -> Self {
        Self(Arc::new(Mutex::new(self.snapshot())))
    }
}

/// A request travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    pathname: String,
    params: Params,
    defaults: ResponseDefaults,
}

impl ApiRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        let pathname = uri.path().to_string();
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            pathname,
            params: Params::default(),
            defaults: ResponseDefaults::default(),
        }
    }

    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let mut req = Self::new(parts.method, parts.uri);
        req.headers = parts.headers;
        req.body = body;
        req
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Enrich with the matched route's pathname and params.
    pub(crate) fn with_route(mut self, pathname: String, params: Params) -> Self {
        self.pathname = pathname;
        self.params = params;
        self
    }

    /// Copy with its own response defaults, detached from this request's.
    pub fn fork(&self) -> Self {
        Self {
            defaults: self.defaults.detached(),
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Pathname the route table was consulted with (may differ from the
    /// URI path when a dispatcher is delegated to).
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    /// Media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header(header::CONTENT_TYPE).map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Decoded query pairs in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Query as a JSON object; repeated keys become arrays.
    pub fn query_json(&self) -> Value {
        pairs_to_object(self.query_pairs())
    }

    pub fn response_defaults(&self) -> &ResponseDefaults {
        &self.defaults
    }
}

/// Fold key/value pairs into an object, collecting repeats into arrays.
pub(crate) fn pairs_to_object(pairs: impl IntoIterator<Item = (String, String)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(map)
}
