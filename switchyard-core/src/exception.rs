//! Exception resolvers.
//!
//! When a handler, an interceptor or a route lookup fails with a recoverable
//! error, the dispatcher asks the [`ExceptionResolverChain`] for a
//! replacement result:
//!
//! - `Some(result)` with a view renders that view instead
//! - `Some(DispatchResult::empty())` means the resolver wrote the response
//!   itself and nothing is rendered
//! - `None` from every resolver re-raises the error
//!
//! ```rust
//! use switchyard_core::{ExceptionResolverChain, MappingExceptionResolver, StatusCodeResolver};
//!
//! let chain = ExceptionResolverChain::new()
//!     .with_resolver(StatusCodeResolver::new())
//!     .with_resolver(
//!         MappingExceptionResolver::new()
//!             .map_kind("NoHandlerFound", "errors/not-found")
//!             .status_for_view("errors/not-found", 404)
//!             .default_view("errors/generic"),
//!     );
//! assert_eq!(chain.len(), 2);
//! ```

use crate::error::Error;
use crate::handler::Handler;
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::{debug, trace, warn};
use crate::mapping::LOWEST_PRECEDENCE;
use crate::result::DispatchResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Exception Resolver Trait
// ============================================================================

/// Turns an error raised during dispatch into a result.
#[async_trait]
pub trait ExceptionResolver: Send + Sync + 'static {
    /// `handler` is `None` when the error happened before a handler was found.
    async fn resolve(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        handler: Option<&Handler>,
        error: &Error,
    ) -> Option<DispatchResult>;

    /// Error kinds (see [`Error::kind`]) this resolver handles; `None` for all.
    fn handles(&self) -> Option<Vec<&'static str>> {
        None
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

// ============================================================================
// Exception Resolver Chain
// ============================================================================

/// Resolvers sorted by [`ExceptionResolver::order`]; the first answer wins.
#[derive(Clone, Default)]
pub struct ExceptionResolverChain {
    resolvers: Vec<Arc<dyn ExceptionResolver>>,
}

impl ExceptionResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver<R: ExceptionResolver>(self, resolver: R) -> Self {
        self.with_resolver_arc(Arc::new(resolver))
    }

    pub fn with_resolver_arc(mut self, resolver: Arc<dyn ExceptionResolver>) -> Self {
        self.push(resolver);
        self
    }

    /// Add a resolver; equal orders keep registration order.
    pub fn push(&mut self, resolver: Arc<dyn ExceptionResolver>) {
        self.resolvers.push(resolver);
        self.resolvers.sort_by_key(|r| r.order());
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolvers(&self) -> &[Arc<dyn ExceptionResolver>] {
        &self.resolvers
    }

    /// Ask each resolver in turn. `None` means nobody handled `error`.
    pub async fn resolve(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        handler: Option<&Handler>,
        error: &Error,
    ) -> Option<DispatchResult> {
        let kind = error.kind();
        for resolver in &self.resolvers {
            if let Some(kinds) = resolver.handles()
                && !kinds.contains(&kind)
            {
                continue;
            }

            trace!(resolver = resolver.name(), error_kind = kind, "Trying exception resolver");
            if let Some(result) = resolver.resolve(request, response, handler, error).await {
                debug!(
                    resolver = resolver.name(),
                    error_kind = kind,
                    view = ?result.view_ref(),
                    "Resolved [{}]",
                    error
                );
                return Some(result);
            }
        }
        None
    }
}

impl fmt::Debug for ExceptionResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ExceptionResolverChain")
            .field("resolvers", &names)
            .finish()
    }
}

// ============================================================================
// Built-in Resolvers
// ============================================================================

/// Errors that carry their own HTTP status.
const STATUS_KINDS: &[&str] = &[
    "BadRequest",
    "Unauthorized",
    "Forbidden",
    "NotFound",
    "MethodNotAllowed",
    "Conflict",
    "UnsupportedMediaType",
    "PayloadTooLarge",
    "ServiceUnavailable",
    "Multipart",
];

/// Sends the status of HTTP-flavoured errors with a short text body.
///
/// Route lookup misses ([`Error::NoHandlerFound`]) and handler failures are
/// left to other resolvers.
#[derive(Debug, Clone)]
pub struct StatusCodeResolver {
    order: i32,
    production_mode: bool,
}

impl StatusCodeResolver {
    pub fn new() -> Self {
        Self {
            order: LOWEST_PRECEDENCE,
            production_mode: true,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// In production mode 5xx bodies carry only the reason phrase.
    pub fn production_mode(mut self, production: bool) -> Self {
        self.production_mode = production;
        self
    }
}

impl Default for StatusCodeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExceptionResolver for StatusCodeResolver {
    async fn resolve(
        &self,
        _request: &HttpRequest,
        response: &mut HttpResponse,
        _handler: Option<&Handler>,
        error: &Error,
    ) -> Option<DispatchResult> {
        if response.is_committed() {
            warn!(error = %error, "Response already committed; cannot send error status");
            return None;
        }
        let status = error.status_code();
        let message = if self.production_mode && error.is_server_error() {
            ::http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Server Error")
                .to_string()
        } else {
            error.to_string()
        };
        response.send_error(status, message);
        Some(DispatchResult::empty())
    }

    fn handles(&self) -> Option<Vec<&'static str>> {
        Some(STATUS_KINDS.to_vec())
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        "StatusCodeResolver"
    }
}

/// Maps error kinds to error views.
///
/// The model gets `exception` (the error message) and `error_kind`
/// attributes. A status can be attached per view name.
#[derive(Debug, Clone, Default)]
pub struct MappingExceptionResolver {
    order: Option<i32>,
    mappings: HashMap<String, String>,
    excluded: HashSet<String>,
    default_view: Option<String>,
    status_codes: HashMap<String, u16>,
    default_status: Option<u16>,
    mapped_handlers: HashSet<String>,
}

impl MappingExceptionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Render `view` for errors of `kind`.
    pub fn map_kind(mut self, kind: impl Into<String>, view: impl Into<String>) -> Self {
        self.mappings.insert(kind.into(), view.into());
        self
    }

    /// Never handle errors of `kind`.
    pub fn exclude_kind(mut self, kind: impl Into<String>) -> Self {
        self.excluded.insert(kind.into());
        self
    }

    /// View for errors without an explicit mapping.
    pub fn default_view(mut self, view: impl Into<String>) -> Self {
        self.default_view = Some(view.into());
        self
    }

    pub fn status_for_view(mut self, view: impl Into<String>, status: u16) -> Self {
        self.status_codes.insert(view.into(), status);
        self
    }

    /// Status for views without an explicit status.
    pub fn default_status(mut self, status: u16) -> Self {
        self.default_status = Some(status);
        self
    }

    /// Only resolve errors raised by these handlers (by name).
    pub fn for_handler(mut self, name: impl Into<String>) -> Self {
        self.mapped_handlers.insert(name.into());
        self
    }

    fn applies_to(&self, handler: Option<&Handler>) -> bool {
        if self.mapped_handlers.is_empty() {
            return true;
        }
        handler.is_some_and(|h| self.mapped_handlers.contains(h.name()))
    }

    fn view_for(&self, error: &Error) -> Option<&String> {
        let kind = error.kind();
        if self.excluded.contains(kind) {
            return None;
        }
        self.mappings.get(kind).or(self.default_view.as_ref())
    }
}

#[async_trait]
impl ExceptionResolver for MappingExceptionResolver {
    async fn resolve(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        handler: Option<&Handler>,
        error: &Error,
    ) -> Option<DispatchResult> {
        if !self.applies_to(handler) {
            return None;
        }
        let view = self.view_for(error)?;

        let mut result = DispatchResult::view_name(view.clone());
        let model = result.model_mut();
        model.insert("exception".to_string(), error.to_string().into());
        model.insert("error_kind".to_string(), error.kind().into());
        if let Some(status) = self.status_codes.get(view).copied().or(self.default_status) {
            result.set_status(status);
        }
        Some(result)
    }

    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }

    fn name(&self) -> &str {
        "MappingExceptionResolver"
    }
}
