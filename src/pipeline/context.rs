//! Per-request context accumulated by middleware.

use axum::http::Extensions;
use serde_json::Value;

use crate::http::response::Blob;

/// Inputs that passed their route schemas.
#[derive(Debug, Clone, Default)]
pub struct ValidatedInput {
    pub params: Option<Value>,
    pub query: Option<Value>,
    pub json: Option<Value>,
    pub form: Option<Value>,
    pub url_encoded: Option<Value>,
    /// Binary parts of a validated multipart body.
    pub files: Vec<(String, Blob)>,
}

/// Authenticated caller, written by whichever auth middleware succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Name of the auth middleware that produced this identity.
    pub scheme: String,
    pub subject: String,
    pub claims: Value,
}

impl Identity {
    pub fn new(scheme: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            subject: subject.into(),
            claims: Value::Null,
        }
    }
}

/// Exclusively owned by one request; created fresh and dropped after the
/// response. Arbitrary typed values go in the extension map.
#[derive(Debug, Clone, Default)]
pub struct Context {
    extensions: Extensions,
    input: ValidatedInput,
    identity: Option<Identity>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions.remove::<T>()
    }

    pub fn input(&self) -> &ValidatedInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut ValidatedInput {
        &mut self.input
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }
}
