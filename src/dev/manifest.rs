//! Route manifest artifact.
//!
//! The dev-mode build artifact is a TOML manifest naming, for each route
//! file, the compiled route module that serves it:
//!
//! ```toml
//! [[route]]
//! file = "hello/[world].ts"
//! module = "hello"
//! ```
//!
//! Modules are looked up in a [`ModuleRegistry`] populated by the
//! application at startup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::dev::coordinator::{ArtifactLoader, LoadError};
use crate::dispatcher::{Dispatcher, RouteModule};
use crate::pipeline::GlobalSpec;
use crate::routing::RouteSource;
use crate::runtime::FetchRuntime;

#[derive(Debug, Clone, Deserialize)]
pub struct RouteManifest {
    #[serde(default, rename = "route")]
    pub routes: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub module: String,
}

impl RouteManifest {
    pub fn parse(text: &str, path: &Path) -> Result<Self, LoadError> {
        toml::from_str(text).map_err(|err| LoadError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub async fn read(path: &Path) -> Result<Self, LoadError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&text, path)
    }
}

/// Compiled route modules by name.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, RouteModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, module: RouteModule) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RouteModule> {
        self.modules.get(name)
    }

    /// Resolve a manifest into a route source, in manifest order.
    pub fn resolve(&self, manifest: &RouteManifest) -> Result<RouteSource<RouteModule>, LoadError> {
        manifest
            .routes
            .iter()
            .map(|entry| {
                self.get(&entry.module)
                    .cloned()
                    .map(|module| (entry.file.clone(), module))
                    .ok_or_else(|| LoadError::UnknownModule(entry.module.clone()))
            })
            .collect()
    }
}

/// Loads a dispatcher (and the runtime around it) from a manifest file.
#[derive(Clone)]
pub struct ManifestLoader {
    global: Arc<GlobalSpec>,
    registry: Arc<ModuleRegistry>,
    body_limit: usize,
}

impl ManifestLoader {
    pub fn new(global: Arc<GlobalSpec>, registry: Arc<ModuleRegistry>, body_limit: usize) -> Self {
        Self {
            global,
            registry,
            body_limit,
        }
    }

    pub async fn load_dispatcher(&self, artifact: &Path) -> Result<Dispatcher, LoadError> {
        let manifest = RouteManifest::read(artifact).await?;
        let source = self.registry.resolve(&manifest)?;
        let dispatcher = Dispatcher::from_modules(&self.global, source)?;
        tracing::info!(
            artifact = %artifact.display(),
            routes = dispatcher.table().len(),
            "Loaded route manifest"
        );
        Ok(dispatcher.with_body_limit(self.body_limit))
    }
}

impl ArtifactLoader<Dispatcher> for ManifestLoader {
    fn load<'a>(&'a self, artifact: &'a Path) -> BoxFuture<'a, Result<Dispatcher, LoadError>> {
        Box::pin(self.load_dispatcher(artifact))
    }
}

impl ArtifactLoader<FetchRuntime> for ManifestLoader {
    fn load<'a>(&'a self, artifact: &'a Path) -> BoxFuture<'a, Result<FetchRuntime, LoadError>> {
        Box::pin(async move {
            let dispatcher = self.load_dispatcher(artifact).await?;
            Ok(FetchRuntime::new(Arc::new(dispatcher)))
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use super::*;
    use crate::http::response::Reply;
    use crate::pipeline::{handler_fn, RouteSpec};

    fn registry() -> ModuleRegistry {
        ModuleRegistry::new().register(
            "ping",
            RouteModule::new(
                RouteSpec::new([Method::GET]),
                handler_fn(|_req, _ctx| async { Ok(Reply::raw("pong")) }),
            ),
        )
    }

    #[test]
    fn test_resolve_in_manifest_order() {
        let manifest = RouteManifest::parse(
            "[[route]]\nfile = \"ping.ts\"\nmodule = \"ping\"\n\n[[route]]\nfile = \"v2/ping.ts\"\nmodule = \"ping\"\n",
            Path::new("routes.toml"),
        )
        .unwrap();
        let source = registry().resolve(&manifest).unwrap();
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_unknown_module() {
        let manifest = RouteManifest::parse(
            "[[route]]\nfile = \"x.ts\"\nmodule = \"missing\"\n",
            Path::new("routes.toml"),
        )
        .unwrap();
        let err = registry().resolve(&manifest).err().unwrap();
        assert!(matches!(err, LoadError::UnknownModule(ref name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let loader = ManifestLoader::new(Arc::default(), Arc::new(registry()), 1024);
        let err = loader
            .load_dispatcher(Path::new("/definitely/not/here.toml"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
