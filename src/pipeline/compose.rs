//! Middleware composition.
//!
//! # Layer Order (outermost first)
//! ```text
//! serialize (outer)      merge defaults + encode, even on early short-circuit
//! exception handler      optional, application supplied
//! global, before auth
//! auth resolution        first-success-wins over the route's auth selector
//! global, after auth
//! route-local
//! method guard
//! serialize (inner)      validate handler output against the route schemas
//! endpoint               input validation, then the route handler
//! ```

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;
use tracing::debug;

use crate::error::ApiError;
use crate::http::request::ApiRequest;
use crate::pipeline::auth::AuthLayer;
use crate::pipeline::context::Context;
use crate::pipeline::guard::MethodGuard;
use crate::pipeline::input::RouteEndpoint;
use crate::pipeline::middleware::{Endpoint, Middleware, Next, PipelineResult};
use crate::pipeline::serialize::SerializeLayer;
use crate::schema::SchemaRef;

/// Sees every collected auth failure, in trial order, and may return a
/// replacement error. `None` raises the last failure.
pub type AuthFailureHook = Arc<dyn Fn(&[ApiError]) -> Option<ApiError> + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ComposeError {
    #[error("route declares no HTTP methods")]
    NoMethods,

    #[error("route requires unknown auth middleware `{0}`")]
    UnknownAuth(String),
}

/// Process-wide pipeline configuration. Read-only once built.
#[derive(Clone)]
pub struct GlobalSpec {
    pub(crate) auth: Vec<(String, Arc<dyn Middleware>)>,
    pub(crate) before_auth: Vec<Arc<dyn Middleware>>,
    pub(crate) after_auth: Vec<Arc<dyn Middleware>>,
    pub(crate) exception_handler: Option<Arc<dyn Middleware>>,
    pub(crate) validate_responses: bool,
    pub(crate) on_auth_failures: Option<AuthFailureHook>,
    pub(crate) not_found: Option<Arc<dyn Endpoint>>,
}

impl Default for GlobalSpec {
    fn default() -> Self {
        Self {
            auth: Vec::new(),
            before_auth: Vec::new(),
            after_auth: Vec::new(),
            exception_handler: None,
            validate_responses: true,
            on_auth_failures: None,
            not_found: None,
        }
    }
}

impl fmt::Debug for GlobalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalSpec")
            .field("auth", &self.auth_names().collect::<Vec<_>>())
            .field("before_auth", &self.before_auth.len())
            .field("after_auth", &self.after_auth.len())
            .field("exception_handler", &self.exception_handler.is_some())
            .field("validate_responses", &self.validate_responses)
            .field("on_auth_failures", &self.on_auth_failures.is_some())
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

impl GlobalSpec {
    pub fn builder() -> GlobalSpecBuilder {
        GlobalSpecBuilder::default()
    }

    /// Auth middleware names in declaration order.
    pub fn auth_names(&self) -> impl Iterator<Item = &str> {
        self.auth.iter().map(|(name, _)| name.as_str())
    }

    pub fn validate_responses(&self) -> bool {
        self.validate_responses
    }

    pub fn not_found(&self) -> Option<&Arc<dyn Endpoint>> {
        self.not_found.as_ref()
    }
}

#[derive(Default)]
pub struct GlobalSpecBuilder {
    spec: GlobalSpec,
}

impl GlobalSpecBuilder {
    /// Register a named auth middleware. Re-registering a name replaces it
    /// in place, keeping its original trial position.
    pub fn auth(mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) -> Self {
        let name = name.into();
        match self.spec.auth.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = middleware,
            None => self.spec.auth.push((name, middleware)),
        }
        self
    }

    pub fn before_auth(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.spec.before_auth.push(middleware);
        self
    }

    pub fn after_auth(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.spec.after_auth.push(middleware);
        self
    }

    pub fn exception_handler(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.spec.exception_handler = Some(middleware);
        self
    }

    pub fn validate_responses(mut self, enabled: bool) -> Self {
        self.spec.validate_responses = enabled;
        self
    }

    pub fn on_auth_failures(
        mut self,
        hook: impl Fn(&[ApiError]) -> Option<ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.spec.on_auth_failures = Some(Arc::new(hook));
        self
    }

    /// Endpoint invoked when no route matches. Defaults to a plain 404.
    pub fn not_found(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.spec.not_found = Some(endpoint);
        self
    }

    pub fn build(self) -> GlobalSpec {
        self.spec
    }
}

/// Which auth middlewares a route accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthSelector {
    #[default]
    None,
    One(String),
    Any(Vec<String>),
}

/// Schemas applied to incoming request parts.
#[derive(Debug, Clone, Default)]
pub struct InputSchemas {
    pub params: Option<SchemaRef>,
    pub query: Option<SchemaRef>,
    pub json: Option<SchemaRef>,
    pub form: Option<SchemaRef>,
    pub url_encoded: Option<SchemaRef>,
}

/// Schemas the handler's typed replies must satisfy.
#[derive(Debug, Clone, Default)]
pub struct OutputSchemas {
    pub json: Option<SchemaRef>,
    pub form: Option<SchemaRef>,
    pub url_encoded: Option<SchemaRef>,
    pub custom: Option<SchemaRef>,
}

/// Per-route declaration.
#[derive(Clone, Default)]
pub struct RouteSpec {
    pub methods: Vec<Method>,
    pub auth: AuthSelector,
    pub input: InputSchemas,
    pub output: OutputSchemas,
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("methods", &self.methods)
            .field("auth", &self.auth)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl RouteSpec {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn auth(mut self, selector: AuthSelector) -> Self {
        self.auth = selector;
        self
    }

    pub fn input(mut self, input: InputSchemas) -> Self {
        self.input = input;
        self
    }

    pub fn output(mut self, output: OutputSchemas) -> Self {
        self.output = output;
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

/// Single handler produced by folding every layer around a route handler.
#[derive(Clone)]
pub struct ComposedHandler {
    layers: Arc<[Arc<dyn Middleware>]>,
    endpoint: Arc<dyn Endpoint>,
    methods: Arc<[Method]>,
}

impl fmt::Debug for ComposedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedHandler")
            .field("layers", &self.layers.len())
            .field("methods", &self.methods)
            .finish()
    }
}

impl ComposedHandler {
    /// Run the whole pipeline for one request with a fresh context.
    pub async fn call(&self, req: ApiRequest) -> PipelineResult {
        Next::new(&self.layers, self.endpoint.as_ref())
            .run(req, Context::new())
            .await
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Build the composed handler for one route.
pub fn compose(
    global: &GlobalSpec,
    route: RouteSpec,
    handler: Arc<dyn Endpoint>,
) -> Result<ComposedHandler, ComposeError> {
    if route.methods.is_empty() {
        return Err(ComposeError::NoMethods);
    }
    let auth = AuthLayer::resolve(global, &route.auth)?;

    let mut layers: Vec<Arc<dyn Middleware>> = Vec::with_capacity(
        6 + global.before_auth.len() + global.after_auth.len() + route.middlewares.len(),
    );
    layers.push(Arc::new(SerializeLayer::outer()));
    if let Some(exception_handler) = &global.exception_handler {
        layers.push(Arc::clone(exception_handler));
    }
    layers.extend(global.before_auth.iter().cloned());
    layers.push(Arc::new(auth));
    layers.extend(global.after_auth.iter().cloned());
    layers.extend(route.middlewares);
    layers.push(Arc::new(MethodGuard::new(route.methods.clone())));
    layers.push(Arc::new(SerializeLayer::inner(
        route.output,
        global.validate_responses,
    )));

    debug!(
        layers = layers.len(),
        methods = ?route.methods,
        "Composed route handler"
    );

    Ok(ComposedHandler {
        layers: layers.into(),
        endpoint: Arc::new(RouteEndpoint::new(route.input, handler)),
        methods: route.methods.into(),
    })
}
