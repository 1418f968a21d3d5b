//! Handler adapters.
//!
//! The dispatcher treats handlers as opaque. An adapter knows how to invoke
//! one handler shape and normalise its result into a [`HandlerOutcome`].
//! [`AdapterRegistry`] picks the first adapter that supports a handler and
//! remembers the choice per concrete handler type.

use crate::cache::LookupCache;
use crate::error::{Error, Result};
use crate::handler::{Controller, Handler, HandlerFn, HandlerOutcome, HttpRequestHandler};
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::trace;
use async_trait::async_trait;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Invokes handlers of one shape.
#[async_trait]
pub trait HandlerAdapter: Send + Sync + 'static {
    fn supports(&self, handler: &Handler) -> bool;

    async fn handle(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        handler: &Handler,
    ) -> Result<HandlerOutcome>;

    /// Last modification time for conditional GET/HEAD, if the handler knows it.
    fn last_modified(&self, _request: &HttpRequest, _handler: &Handler) -> Option<SystemTime> {
        None
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

fn unsupported(adapter: &str, handler: &Handler) -> Error {
    Error::NoAdapter(format!(
        "{} cannot invoke handler [{}]",
        adapter,
        handler.name()
    ))
}

/// Adapter for [`Controller`] handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControllerAdapter;

#[async_trait]
impl HandlerAdapter for ControllerAdapter {
    fn supports(&self, handler: &Handler) -> bool {
        handler.is::<Arc<dyn Controller>>()
    }

    async fn handle(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        handler: &Handler,
    ) -> Result<HandlerOutcome> {
        let controller = handler
            .downcast_ref::<Arc<dyn Controller>>()
            .ok_or_else(|| unsupported(self.name(), handler))?;
        controller.handle(request, response).await
    }

    fn last_modified(&self, request: &HttpRequest, handler: &Handler) -> Option<SystemTime> {
        handler
            .downcast_ref::<Arc<dyn Controller>>()
            .and_then(|c| c.last_modified(request))
    }

    fn name(&self) -> &str {
        "ControllerAdapter"
    }
}

/// Adapter for [`HttpRequestHandler`] handlers; nothing is rendered.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestHandlerAdapter;

#[async_trait]
impl HandlerAdapter for RequestHandlerAdapter {
    fn supports(&self, handler: &Handler) -> bool {
        handler.is::<Arc<dyn HttpRequestHandler>>()
    }

    async fn handle(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        handler: &Handler,
    ) -> Result<HandlerOutcome> {
        let target = handler
            .downcast_ref::<Arc<dyn HttpRequestHandler>>()
            .ok_or_else(|| unsupported(self.name(), handler))?;
        target.handle_request(request, response).await?;
        Ok(HandlerOutcome::handled())
    }

    fn name(&self) -> &str {
        "RequestHandlerAdapter"
    }
}

/// Adapter for closure handlers.
///
/// The closure receives a copy of the request; the response it returns is
/// copied onto the dispatch response.
#[derive(Debug, Default, Clone, Copy)]
pub struct FnHandlerAdapter;

#[async_trait]
impl HandlerAdapter for FnHandlerAdapter {
    fn supports(&self, handler: &Handler) -> bool {
        handler.is::<HandlerFn>()
    }

    async fn handle(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        handler: &Handler,
    ) -> Result<HandlerOutcome> {
        let f = handler
            .downcast_ref::<HandlerFn>()
            .ok_or_else(|| unsupported(self.name(), handler))?;
        let produced = (**f)(request.clone()).await?;

        response.status = produced.status;
        for (name, value) in produced.headers {
            response.set_header(name, value);
        }
        response.body = produced.body;
        Ok(HandlerOutcome::handled())
    }

    fn name(&self) -> &str {
        "FnHandlerAdapter"
    }
}

/// Ordered adapter list with a per-type index cache.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn HandlerAdapter>>,
    index: LookupCache<TypeId, usize>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in adapters.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_adapter(Arc::new(RequestHandlerAdapter))
            .with_adapter(Arc::new(ControllerAdapter))
            .with_adapter(Arc::new(FnHandlerAdapter))
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn HandlerAdapter>) -> Self {
        self.push(adapter);
        self
    }

    pub fn push(&mut self, adapter: Arc<dyn HandlerAdapter>) {
        self.adapters.push(adapter);
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn adapters(&self) -> &[Arc<dyn HandlerAdapter>] {
        &self.adapters
    }

    /// First adapter supporting `handler`, or [`Error::NoAdapter`].
    pub fn find(&self, handler: &Handler) -> Result<Arc<dyn HandlerAdapter>> {
        let type_id = handler.target_type_id();
        if let Some(idx) = self.index.get(&type_id)
            && let Some(adapter) = self.adapters.get(idx)
            && adapter.supports(handler)
        {
            trace!(handler = handler.name(), adapter = adapter.name(), "Adapter cache hit");
            return Ok(Arc::clone(adapter));
        }

        for (idx, adapter) in self.adapters.iter().enumerate() {
            if adapter.supports(handler) {
                self.index.insert(type_id, idx);
                trace!(handler = handler.name(), adapter = adapter.name(), "Adapter selected");
                return Ok(Arc::clone(adapter));
            }
        }

        Err(Error::NoAdapter(handler.name().to_string()))
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.adapters.iter().map(|a| a.name()).collect();
        f.debug_struct("AdapterRegistry").field("adapters", &names).finish()
    }
}
