//! Route tables.
//!
//! A [`HandlerMapping`] turns a request into an [`ExecutionChain`]. The
//! shipped mappings share [`MappingSupport`], which owns the lookup-path
//! rules, the default handler, interceptor registrations, handler name
//! resolution and CORS handling.

mod name;
mod url;

pub use name::NameHandlerMapping;
pub use url::{RouteMatch, UrlHandlerMapping};

use crate::cors::{
    CorsConfig, CorsConfigSource, CorsInterceptor, CorsProcessor, DefaultCorsProcessor,
    PreflightHandler, is_cors_request, is_preflight_request,
};
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerRef};
use crate::http::HttpRequest;
use crate::interceptor::{ExecutionChain, HandlerInterceptor, InterceptorRegistry, MappedInterceptor};
use crate::logging::{debug, trace};
use crate::path_helper::PathHelper;
use crate::path_matcher::AntPathMatcher;
use crate::registry::HandlerRegistry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lowest precedence; mappings with a smaller order are consulted first.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Maps a request to a handler chain.
pub trait HandlerMapping: Send + Sync {
    /// `Ok(None)` lets the next mapping try.
    fn handler(&self, request: &HttpRequest) -> Result<Option<ExecutionChain>>;

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Pattern that selected the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMatchingPattern(pub String);

/// Part of the lookup path matched by the wildcard portion of the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathWithinMapping(pub String);

/// Template variables captured by the best matching pattern(s).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriTemplateVariables(pub HashMap<String, String>);

/// Handler the route table selected, before any CORS substitution.
#[derive(Debug, Clone)]
pub struct BestMatchingHandler(pub Handler);

/// Path the route table matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath(pub String);

/// Behaviour shared by URL-based route tables.
pub struct MappingSupport {
    order: i32,
    default_handler: Option<HandlerRef>,
    path_helper: PathHelper,
    matcher: Arc<AntPathMatcher>,
    interceptors: InterceptorRegistry,
    cors_source: Option<Arc<dyn CorsConfigSource>>,
    cors_processor: Arc<dyn CorsProcessor>,
    registry: Option<Arc<dyn HandlerRegistry>>,
    lazy_init: bool,
}

impl Default for MappingSupport {
    fn default() -> Self {
        let matcher = Arc::new(AntPathMatcher::new());
        Self {
            order: LOWEST_PRECEDENCE,
            default_handler: None,
            path_helper: PathHelper::default(),
            interceptors: InterceptorRegistry::new().with_matcher(Arc::clone(&matcher)),
            matcher,
            cors_source: None,
            cors_processor: Arc::new(DefaultCorsProcessor),
            registry: None,
            lazy_init: false,
        }
    }
}

impl MappingSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn set_order(&mut self, order: i32) {
        self.order = order;
    }

    pub fn matcher(&self) -> &Arc<AntPathMatcher> {
        &self.matcher
    }

    pub fn set_matcher(&mut self, matcher: Arc<AntPathMatcher>) {
        self.interceptors = std::mem::take(&mut self.interceptors).with_matcher(Arc::clone(&matcher));
        self.matcher = matcher;
    }

    pub fn path_helper(&self) -> &PathHelper {
        &self.path_helper
    }

    pub fn set_path_helper(&mut self, helper: PathHelper) {
        self.path_helper = helper;
    }

    pub fn set_registry(&mut self, registry: Arc<dyn HandlerRegistry>) {
        self.registry = Some(registry);
    }

    pub fn registry(&self) -> Option<&Arc<dyn HandlerRegistry>> {
        self.registry.as_ref()
    }

    pub fn set_lazy_init(&mut self, lazy: bool) {
        self.lazy_init = lazy;
    }

    pub fn lazy_init(&self) -> bool {
        self.lazy_init
    }

    pub fn interceptors_mut(&mut self) -> &mut InterceptorRegistry {
        &mut self.interceptors
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn HandlerInterceptor>) {
        self.interceptors.add(interceptor);
    }

    pub fn add_mapped_interceptor(&mut self, mapped: MappedInterceptor) {
        self.interceptors.add_mapped(mapped);
    }

    pub fn set_cors_source(&mut self, source: Arc<dyn CorsConfigSource>) {
        self.cors_source = Some(source);
    }

    pub fn set_cors_processor(&mut self, processor: Arc<dyn CorsProcessor>) {
        self.cors_processor = processor;
    }

    pub fn default_handler(&self) -> Option<&HandlerRef> {
        self.default_handler.as_ref()
    }

    /// Handler used when nothing else matches. A different second default
    /// handler is a configuration error.
    pub fn set_default_handler(&mut self, handler: HandlerRef) -> Result<()> {
        let handler = self.prepare(handler)?;
        match &self.default_handler {
            Some(existing) if existing.same_as(&handler) => Ok(()),
            Some(existing) => Err(Error::Configuration(format!(
                "Cannot map {} as default handler: there is already {} mapped",
                handler.describe(),
                existing.describe()
            ))),
            None => {
                debug!(handler = %handler.describe(), "Default mapping");
                self.default_handler = Some(handler);
                Ok(())
            }
        }
    }

    /// Lookup path for `request`.
    pub fn lookup_path(&self, request: &HttpRequest) -> String {
        self.path_helper.lookup_path(request)
    }

    /// Resolve a name at registration time unless lazy initialisation is on.
    pub fn prepare(&self, handler: HandlerRef) -> Result<HandlerRef> {
        match handler {
            HandlerRef::Unresolved(name) if !self.lazy_init => {
                Ok(HandlerRef::Resolved(self.resolve_name(&name)?))
            }
            other => Ok(other),
        }
    }

    fn resolve_name(&self, name: &str) -> Result<Handler> {
        let registry = self.registry.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "Cannot resolve handler '{}': no handler registry configured",
                name
            ))
        })?;
        registry.resolve(name)?.ok_or_else(|| {
            Error::Configuration(format!("No handler named '{}' is registered", name))
        })
    }

    /// Turn a matched handler reference into the request's chain.
    ///
    /// `exposed` carries the match attributes; the mapping's interceptors
    /// are appended after those of a pre-built chain, and CORS handling is
    /// applied last.
    pub fn complete(
        &self,
        request: &HttpRequest,
        lookup_path: &str,
        handler: &HandlerRef,
        exposed: ExposedMatch,
    ) -> Result<ExecutionChain> {
        let chain = match handler {
            HandlerRef::Unresolved(name) => {
                trace!(handler = %name, "Resolving handler by name");
                self.interceptors.build(self.resolve_name(name)?, lookup_path)
            }
            HandlerRef::Resolved(handler) => self.interceptors.build(handler.clone(), lookup_path),
            HandlerRef::Chain(chain) => self.interceptors.extend(chain.clone(), lookup_path),
        };

        let best = chain.handler().clone();
        let mut chain = chain
            .expose(LookupPath(lookup_path.to_string()))
            .expose(BestMatchingPattern(exposed.pattern))
            .expose(PathWithinMapping(exposed.path_within_mapping))
            .expose(BestMatchingHandler(best));
        if let Some(vars) = exposed.uri_variables {
            chain = chain.expose(UriTemplateVariables(vars));
        }

        Ok(self.apply_cors(chain, request, lookup_path))
    }

    fn apply_cors(&self, chain: ExecutionChain, request: &HttpRequest, lookup_path: &str) -> ExecutionChain {
        let preflight = is_preflight_request(request);
        if !preflight && !is_cors_request(request) {
            return chain;
        }

        let global = self
            .cors_source
            .as_ref()
            .and_then(|source| source.cors_config(request, lookup_path));
        let config = merge_cors(global, chain.handler().cors_config());

        if preflight {
            debug!(handler = chain.handler().name(), "Answering CORS preflight");
            let original = chain.handler().clone();
            let stand_in = PreflightHandler::new(config, Arc::clone(&self.cors_processor));
            chain.replace_handler(stand_in.into_handler(&original))
        } else {
            chain.prepend(Arc::new(CorsInterceptor::new(config, Arc::clone(&self.cors_processor))))
        }
    }
}

fn merge_cors(global: Option<CorsConfig>, local: Option<&CorsConfig>) -> Option<CorsConfig> {
    match (global, local) {
        (Some(global), Some(local)) => Some(global.combine(local)),
        (global, local) => global.or_else(|| local.cloned()),
    }
}

impl fmt::Debug for MappingSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingSupport")
            .field("order", &self.order)
            .field("default_handler", &self.default_handler.as_ref().map(|h| h.describe()))
            .field("interceptors", &self.interceptors)
            .field("cors", &self.cors_source.is_some())
            .field("lazy_init", &self.lazy_init)
            .finish()
    }
}

/// Match details handed to [`MappingSupport::complete`].
#[derive(Debug, Clone, Default)]
pub struct ExposedMatch {
    pub pattern: String,
    pub path_within_mapping: String,
    pub uri_variables: Option<HashMap<String, String>>,
}
