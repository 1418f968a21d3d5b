// Route table built from handler names that look like URL paths

use super::{HandlerMapping, MappingSupport, RouteMatch, UrlHandlerMapping};
use crate::error::Result;
use crate::handler::HandlerRef;
use crate::http::HttpRequest;
use crate::interceptor::ExecutionChain;
use crate::logging::debug;
use crate::registry::HandlerRegistry;
use std::sync::Arc;

/// Maps every registry name or alias starting with `/` to its handler.
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard_core::{Handler, HttpResponse, NameHandlerMapping, StaticHandlerRegistry};
///
/// let registry = Arc::new(StaticHandlerRegistry::new());
/// registry.register(Handler::from_fn("/reports/*", |_req| async { Ok(HttpResponse::ok()) }));
/// registry.register(Handler::from_fn("internal", |_req| async { Ok(HttpResponse::ok()) }));
///
/// let mapping = NameHandlerMapping::detect(registry).unwrap();
/// assert!(mapping.lookup("/reports/q1").unwrap().is_some());
/// assert!(mapping.lookup("/internal").unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct NameHandlerMapping {
    inner: UrlHandlerMapping,
}

impl NameHandlerMapping {
    /// Scan `registry` and register the URL-like names.
    pub fn detect(registry: Arc<dyn HandlerRegistry>) -> Result<Self> {
        Self::detect_with(registry, MappingSupport::new())
    }

    /// Scan `registry` with preconfigured support (interceptors, lazy init,
    /// CORS).
    pub fn detect_with(registry: Arc<dyn HandlerRegistry>, mut support: MappingSupport) -> Result<Self> {
        support.set_registry(Arc::clone(&registry));
        let mut inner = UrlHandlerMapping::new();
        *inner.support_mut() = support;

        for name in registry.names() {
            let urls: Vec<String> = std::iter::once(name.clone())
                .chain(registry.aliases(&name))
                .filter(|url| url.starts_with('/'))
                .collect();
            if urls.is_empty() {
                continue;
            }
            debug!(handler = %name, urls = ?urls, "Detected URL-named handler");
            for url in &urls {
                inner.register_handler(url, HandlerRef::named(name.clone()))?;
            }
        }
        Ok(Self { inner })
    }

    pub fn set_use_trailing_slash_match(&mut self, enabled: bool) {
        self.inner.set_use_trailing_slash_match(enabled);
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.inner = self.inner.with_order(order);
        self
    }

    pub fn lookup(&self, lookup_path: &str) -> Result<Option<RouteMatch>> {
        self.inner.lookup(lookup_path)
    }

    pub fn patterns(&self) -> &[String] {
        self.inner.patterns()
    }

    pub fn support_mut(&mut self) -> &mut MappingSupport {
        self.inner.support_mut()
    }
}

impl HandlerMapping for NameHandlerMapping {
    fn handler(&self, request: &HttpRequest) -> Result<Option<ExecutionChain>> {
        self.inner.handler(request)
    }

    fn order(&self) -> i32 {
        self.inner.support().order()
    }

    fn name(&self) -> &str {
        "NameHandlerMapping"
    }
}
