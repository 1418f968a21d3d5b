//! The dispatcher: request lifecycle orchestration.
//!
//! For every request the [`Dispatcher`]:
//!
//! 1. parses multipart bodies when a [`MultipartResolver`] is configured
//! 2. asks the handler mappings, in order, for an [`ExecutionChain`]
//! 3. finds the [`HandlerAdapter`] for the chain's handler
//! 4. answers unchanged GET/HEAD resources with 304
//! 5. runs the `before` hooks; a halt ends the request
//! 6. invokes the handler, which may defer its result
//! 7. fills in a default view name
//! 8. runs the `after` hooks
//! 9. hands recoverable errors to the exception resolvers
//! 10. resolves and renders the view
//! 11. runs the `completion` hooks exactly once
//!
//! ```rust
//! use switchyard_core::{
//!     Dispatcher, Handler, HttpRequest, HttpResponse, UrlHandlerMapping,
//! };
//!
//! # tokio_test::block_on(async {
//! let mut mapping = UrlHandlerMapping::new();
//! mapping
//!     .register_handler("/hello", Handler::from_fn("hello", |_req| async {
//!         Ok(HttpResponse::ok().with_body(b"hi".to_vec()))
//!     }))
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();
//!
//! let mut req = HttpRequest::new("GET", "/hello");
//! let mut res = HttpResponse::ok();
//! let outcome = dispatcher.dispatch(&mut req, &mut res).await.unwrap();
//! assert!(!outcome.is_suspended());
//! assert_eq!(res.body_string(), "hi");
//! # });
//! ```

use crate::adapter::{AdapterRegistry, HandlerAdapter};
use crate::attributes::AttributeSnapshot;
use crate::conditional::{check_not_modified, is_conditional_method};
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::exception::{ExceptionResolver, ExceptionResolverChain};
use crate::flash::{FlashMapManager, FlashMapManagerHandle, InputFlashMap, OutputFlashMap};
use crate::handler::{Continuation, HandlerOutcome};
use crate::http::{DispatchType, HttpRequest, HttpResponse};
use crate::interceptor::{ExecutionChain, Flow, HookProgress};
use crate::locale::{AcceptHeaderLocaleResolver, CurrentLocale, LocaleResolver};
use crate::logging::{debug, error, trace, warn};
use crate::mapping::{HandlerMapping, MappingSupport, NameHandlerMapping, UriTemplateVariables};
use crate::multipart::{MultipartFailure, MultipartForm, MultipartResolver};
use crate::registry::HandlerRegistry;
use crate::result::{DispatchResult, ViewRef};
use crate::strategies::DefaultStrategies;
use crate::view::{ViewNameTranslator, ViewResolver, ViewResolverChain};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// How a call to [`Dispatcher::dispatch`] ended.
#[derive(Debug)]
pub enum Dispatched {
    /// The response is complete.
    Completed,
    /// The handler deferred its result; finish with [`AsyncDispatch::resume`].
    Suspended(AsyncDispatch),
}

impl Dispatched {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Dispatched::Suspended(_))
    }

    /// The pending dispatch, if suspended.
    pub fn into_async(self) -> Option<AsyncDispatch> {
        match self {
            Dispatched::Suspended(pending) => Some(pending),
            Dispatched::Completed => None,
        }
    }
}

/// Per-request state kept outside the immutable chain.
#[derive(Default)]
struct DispatchState {
    chain: Option<ExecutionChain>,
    progress: HookProgress,
    multipart_parsed: bool,
}

/// What the handler phase produced.
enum Invocation {
    /// Handler ran; the result, if any, is to be rendered.
    Done(Option<DispatchResult>),
    /// The response is already final (404, 304, halted by an interceptor).
    Finished,
    Pending(Continuation),
}

/// A dispatch suspended while its handler produces the result elsewhere.
///
/// Dropping it without resuming runs no further hooks.
pub struct AsyncDispatch {
    dispatcher: Dispatcher,
    state: DispatchState,
    continuation: Continuation,
    snapshot: Option<AttributeSnapshot>,
}

impl AsyncDispatch {
    /// Wait for the deferred result and finish the request: default view
    /// name, `after` hooks, exception resolution, rendering and completion.
    ///
    /// If the continuation was aborted, completion still runs with
    /// [`Error::AsyncAborted`], which is then returned.
    pub async fn resume(self, request: &mut HttpRequest, response: &mut HttpResponse) -> Result<()> {
        let AsyncDispatch {
            dispatcher,
            mut state,
            continuation,
            snapshot,
        } = self;
        let span = tracing::debug_span!("resume", method = %request.method, path = %request.path);

        async move {
            let outcome = match continuation.settle().await {
                Ok(result) => dispatcher.after_handler(request, response, &state, result).await,
                Err(e) => Err(e),
            };
            let processed = match outcome {
                Err(e @ Error::AsyncAborted(_)) => {
                    warn!(error = %e, "Asynchronous handling aborted");
                    Err(e)
                }
                other => dispatcher.process_result(request, response, &state, other).await,
            };
            let finished = dispatcher.finish(request, response, &mut state, processed).await;
            dispatcher.restore_include(request, snapshot);
            finished
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for AsyncDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDispatch")
            .field("chain", &self.state.chain)
            .field("progress", &self.state.progress)
            .finish()
    }
}

struct DispatcherInner {
    config: DispatcherConfig,
    mappings: Vec<Arc<dyn HandlerMapping>>,
    adapters: AdapterRegistry,
    exception_resolvers: ExceptionResolverChain,
    view_resolvers: ViewResolverChain,
    name_translator: Option<Arc<dyn ViewNameTranslator>>,
    locale_resolver: Arc<dyn LocaleResolver>,
    flash_manager: Option<Arc<dyn FlashMapManager>>,
    multipart: Option<Arc<dyn MultipartResolver>>,
}

/// Central request dispatcher. Cheap to clone; all strategies are immutable
/// after [`DispatcherBuilder::build`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn mappings(&self) -> &[Arc<dyn HandlerMapping>] {
        &self.inner.mappings
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.inner.adapters
    }

    /// Dispatch one request.
    ///
    /// `Ok(Dispatched::Completed)` covers every answered request, including
    /// 404, 304, interceptor halts and resolved errors. `Err` is an
    /// unresolved or fatal error; completion hooks have run either way.
    pub async fn dispatch(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<Dispatched> {
        let span = tracing::debug_span!("dispatch", method = %request.method, path = %request.path);
        async move {
            let snapshot = (request.dispatch_type == DispatchType::Include
                && self.inner.config.cleanup_after_include)
                .then(|| request.attributes.snapshot());

            self.publish_flash_maps(request);
            let outcome = self.do_dispatch(request, response).await;

            match outcome {
                Ok(Dispatched::Suspended(mut pending)) => {
                    pending.snapshot = snapshot;
                    Ok(Dispatched::Suspended(pending))
                }
                other => {
                    self.restore_include(request, snapshot);
                    other
                }
            }
        }
        .instrument(span)
        .await
    }

    fn restore_include(&self, request: &mut HttpRequest, snapshot: Option<AttributeSnapshot>) {
        if let Some(snapshot) = snapshot {
            trace!(attributes = snapshot.len(), "Restoring attributes after include");
            request.attributes.restore(snapshot);
        }
    }

    fn publish_flash_maps(&self, request: &mut HttpRequest) {
        let Some(manager) = &self.inner.flash_manager else {
            return;
        };
        if request.dispatch_type != DispatchType::Include
            && !request.attributes.contains::<InputFlashMap>()
            && let Some(input) = manager.retrieve_and_update(request)
        {
            request.attributes.insert(InputFlashMap(Arc::new(input)));
        }
        if !request.attributes.contains::<OutputFlashMap>() {
            request.attributes.insert(OutputFlashMap::new());
        }
        request
            .attributes
            .insert(FlashMapManagerHandle(Arc::clone(manager)));
    }

    async fn do_dispatch(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<Dispatched> {
        let mut state = DispatchState::default();
        self.check_multipart(request, &mut state)?;

        let processed = match self.invoke(request, response, &mut state).await {
            Ok(Invocation::Pending(continuation)) => {
                debug!("Handler deferred its result; dispatch suspended");
                return Ok(Dispatched::Suspended(AsyncDispatch {
                    dispatcher: self.clone(),
                    state,
                    continuation,
                    snapshot: None,
                }));
            }
            Ok(Invocation::Finished) => Ok(()),
            Ok(Invocation::Done(result)) => {
                self.process_result(request, response, &state, Ok(result)).await
            }
            Err(e) => self.process_result(request, response, &state, Err(e)).await,
        };

        self.finish(request, response, &mut state, processed)
            .await
            .map(|()| Dispatched::Completed)
    }

    /// Parse multipart bodies before lookup. Failures are fatal except on
    /// error dispatches.
    fn check_multipart(&self, request: &mut HttpRequest, state: &mut DispatchState) -> Result<()> {
        let Some(resolver) = &self.inner.multipart else {
            return Ok(());
        };
        if !resolver.is_multipart(request) {
            return Ok(());
        }
        if request.attributes.contains::<MultipartForm>() {
            trace!("Multipart request already parsed");
            return Ok(());
        }
        let error_dispatch = request.dispatch_type == DispatchType::Error;
        if error_dispatch && request.attributes.contains::<MultipartFailure>() {
            debug!("Skipping multipart parsing after an earlier failure");
            return Ok(());
        }

        match resolver.resolve(request) {
            Ok(()) => {
                state.multipart_parsed = true;
                Ok(())
            }
            Err(e) => {
                request.attributes.insert(MultipartFailure(e.to_string()));
                if error_dispatch {
                    debug!(error = %e, "Multipart parsing failed on error dispatch; proceeding unparsed");
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Lookup, conditional check, `before` hooks and the handler call.
    async fn invoke(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        state: &mut DispatchState,
    ) -> Result<Invocation> {
        let Some(chain) = self.handler_chain(request)? else {
            return self.no_handler_found(request, response);
        };
        request.attributes.extend_from(chain.exposed());
        if let Some(vars) = chain.exposed().get::<UriTemplateVariables>() {
            request.path_params = vars.0.clone();
        }
        let chain = state.chain.insert(chain).clone();
        let handler = chain.handler();

        let adapter = self.inner.adapters.find(handler)?;

        if is_conditional_method(request)
            && let Some(last_modified) = adapter.last_modified(request, handler)
            && check_not_modified(request, response, last_modified)
        {
            debug!(handler = handler.name(), "Resource not modified");
            return Ok(Invocation::Finished);
        }

        if chain
            .apply_before(request, response, &mut state.progress)
            .await?
            == Flow::Halt
        {
            return Ok(Invocation::Finished);
        }

        trace!(handler = handler.name(), adapter = adapter.name(), "Invoking handler");
        match adapter.handle(request, response, handler).await? {
            HandlerOutcome::Pending(continuation) => {
                chain.apply_concurrent_handling_started(request, response).await;
                Ok(Invocation::Pending(continuation))
            }
            HandlerOutcome::Ready(result) => self
                .after_handler(request, response, state, result)
                .await
                .map(Invocation::Done),
        }
    }

    fn handler_chain(&self, request: &HttpRequest) -> Result<Option<ExecutionChain>> {
        for mapping in &self.inner.mappings {
            trace!(mapping = mapping.name(), "Testing handler mapping");
            if let Some(chain) = mapping.handler(request)? {
                return Ok(Some(chain));
            }
        }
        Ok(None)
    }

    fn no_handler_found(&self, request: &HttpRequest, response: &mut HttpResponse) -> Result<Invocation> {
        if self.inner.config.throw_if_no_handler_found {
            return Err(Error::NoHandlerFound {
                method: request.method.clone(),
                path: request.path.clone(),
            });
        }
        debug!(method = %request.method, path = %request.path, "No handler found");
        response.send_error(404, "Not Found");
        Ok(Invocation::Finished)
    }

    /// Default view name, then `after` hooks.
    async fn after_handler(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        state: &DispatchState,
        mut result: Option<DispatchResult>,
    ) -> Result<Option<DispatchResult>> {
        if let Some(result) = result.as_mut() {
            self.apply_default_view_name(request, result);
        }
        if let Some(chain) = &state.chain {
            chain.apply_after(request, response, result.as_mut()).await?;
        }
        Ok(result)
    }

    fn apply_default_view_name(&self, request: &HttpRequest, result: &mut DispatchResult) {
        if result.has_view() {
            return;
        }
        if let Some(name) = self
            .inner
            .name_translator
            .as_ref()
            .and_then(|t| t.view_name(request))
        {
            trace!(view = %name, "Using default view name");
            result.set_view_name(name);
        }
    }

    /// Exception resolution and rendering.
    async fn process_result(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        state: &DispatchState,
        outcome: Result<Option<DispatchResult>>,
    ) -> Result<()> {
        let result = match outcome {
            Ok(result) => result,
            Err(e) if e.is_fatal() => {
                error!(error = %e, kind = e.kind(), "Dispatch failed");
                return Err(e);
            }
            Err(e) => {
                let handler = state.chain.as_ref().map(|c| c.handler());
                match self
                    .inner
                    .exception_resolvers
                    .resolve(request, response, handler, &e)
                    .await
                {
                    Some(resolved) if resolved.is_empty() => {
                        debug!(error = %e, "Error handled by resolver");
                        None
                    }
                    Some(mut resolved) => {
                        debug!(error = %e, view = ?resolved.view_ref(), "Error resolved to a view");
                        self.apply_default_view_name(request, &mut resolved);
                        Some(resolved)
                    }
                    None => return Err(e),
                }
            }
        };

        match result {
            Some(result) if !result.was_cleared() => self.render(result, request, response).await,
            _ => Ok(()),
        }
    }

    async fn render(
        &self,
        mut result: DispatchResult,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<()> {
        let locale = self.inner.locale_resolver.resolve_locale(request);
        if !response.has_header("Content-Language") {
            response.set_header("Content-Language", locale.tag());
        }
        request.attributes.insert(CurrentLocale(locale.clone()));

        let view = match result.take_view() {
            Some(ViewRef::Resolved(view)) => view,
            Some(ViewRef::Named(name)) => self
                .inner
                .view_resolvers
                .resolve_view_name(&name, &locale)?
                .ok_or_else(|| {
                    Error::ViewResolution(format!("no view resolver could resolve view '{}'", name))
                })?,
            None => {
                return Err(Error::ViewResolution(
                    "result has neither a view name nor a view".to_string(),
                ));
            }
        };

        if let Some(status) = result.status() {
            response.status = status;
        }
        debug!(view = view.name(), locale = %locale, "Rendering view");
        view.render(result.model(), request, response).await
    }

    /// Completion hooks, then multipart cleanup.
    async fn finish(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        state: &mut DispatchState,
        processed: Result<()>,
    ) -> Result<()> {
        if let Some(chain) = &state.chain {
            chain
                .trigger_completion(request, response, &mut state.progress, processed.as_ref().err())
                .await;
        }
        if state.multipart_parsed
            && let Some(resolver) = &self.inner.multipart
        {
            resolver.cleanup(request);
        }
        processed
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mappings: Vec<&str> = self.inner.mappings.iter().map(|m| m.name()).collect();
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("mappings", &mappings)
            .field("adapters", &self.inner.adapters)
            .field("exception_resolvers", &self.inner.exception_resolvers)
            .field("view_resolvers", &self.inner.view_resolvers)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Dispatcher`]. Strategy kinds left empty are filled from
/// the [`DefaultStrategies`] table.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    mappings: Vec<Arc<dyn HandlerMapping>>,
    adapters: Vec<Arc<dyn HandlerAdapter>>,
    exception_resolvers: Vec<Arc<dyn ExceptionResolver>>,
    view_resolvers: Vec<Arc<dyn ViewResolver>>,
    name_translator: Option<Arc<dyn ViewNameTranslator>>,
    locale_resolver: Option<Arc<dyn LocaleResolver>>,
    flash_manager: Option<Arc<dyn FlashMapManager>>,
    multipart: Option<Arc<dyn MultipartResolver>>,
    registry: Option<Arc<dyn HandlerRegistry>>,
    strategies: Option<DefaultStrategies>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn throw_if_no_handler_found(mut self, enabled: bool) -> Self {
        self.config.throw_if_no_handler_found = enabled;
        self
    }

    pub fn cleanup_after_include(mut self, enabled: bool) -> Self {
        self.config.cleanup_after_include = enabled;
        self
    }

    /// `false` keeps only the highest-precedence mapping.
    pub fn detect_all_handler_mappings(mut self, enabled: bool) -> Self {
        self.config.detect_all_handler_mappings = enabled;
        self
    }

    pub fn mapping<M: HandlerMapping + 'static>(self, mapping: M) -> Self {
        self.mapping_arc(Arc::new(mapping))
    }

    pub fn mapping_arc(mut self, mapping: Arc<dyn HandlerMapping>) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn adapter<A: HandlerAdapter>(mut self, adapter: A) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn exception_resolver<R: ExceptionResolver>(mut self, resolver: R) -> Self {
        self.exception_resolvers.push(Arc::new(resolver));
        self
    }

    pub fn exception_resolver_arc(mut self, resolver: Arc<dyn ExceptionResolver>) -> Self {
        self.exception_resolvers.push(resolver);
        self
    }

    pub fn view_resolver<R: ViewResolver>(mut self, resolver: R) -> Self {
        self.view_resolvers.push(Arc::new(resolver));
        self
    }

    pub fn view_name_translator<T: ViewNameTranslator>(mut self, translator: T) -> Self {
        self.name_translator = Some(Arc::new(translator));
        self
    }

    pub fn locale_resolver<L: LocaleResolver + 'static>(mut self, resolver: L) -> Self {
        self.locale_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn flash_map_manager(mut self, manager: Arc<dyn FlashMapManager>) -> Self {
        self.flash_manager = Some(manager);
        self
    }

    pub fn multipart_resolver<M: MultipartResolver>(mut self, resolver: M) -> Self {
        self.multipart = Some(Arc::new(resolver));
        self
    }

    /// Registry for URL-named handlers, detected when no mapping is given.
    pub fn registry(mut self, registry: Arc<dyn HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the bundled default strategy table.
    pub fn default_strategies(mut self, strategies: DefaultStrategies) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        let defaults = match &self.strategies {
            Some(table) => table,
            None => DefaultStrategies::bundled()?,
        };
        let config = self.config;

        let mut mappings = self.mappings;
        if mappings.is_empty()
            && let Some(registry) = &self.registry
            && defaults.detects_named_handlers()
        {
            let mut support = MappingSupport::new();
            support.set_path_helper(config.path_helper());
            support.set_lazy_init(config.lazy_init_handlers);
            let mut mapping = NameHandlerMapping::detect_with(Arc::clone(registry), support)?;
            mapping.set_use_trailing_slash_match(config.use_trailing_slash_match);
            mappings.push(Arc::new(mapping));
        }
        mappings.sort_by_key(|m| m.order());
        if !config.detect_all_handler_mappings {
            mappings.truncate(1);
        }
        if mappings.is_empty() {
            warn!("No handler mappings configured; every request will be unmatched");
        }

        let adapter_list = if self.adapters.is_empty() {
            defaults.adapters()?
        } else {
            self.adapters
        };
        let adapters = adapter_list
            .into_iter()
            .fold(AdapterRegistry::new(), AdapterRegistry::with_adapter);

        let resolver_list = if self.exception_resolvers.is_empty() {
            defaults.exception_resolvers()?
        } else {
            self.exception_resolvers
        };
        let exception_resolvers = resolver_list
            .into_iter()
            .fold(ExceptionResolverChain::new(), ExceptionResolverChain::with_resolver_arc);

        let view_list = if self.view_resolvers.is_empty() {
            defaults.view_resolvers()?
        } else {
            self.view_resolvers
        };
        let view_resolvers = view_list
            .into_iter()
            .fold(ViewResolverChain::new(), ViewResolverChain::with_resolver_arc);

        let name_translator = match self.name_translator {
            Some(t) => Some(t),
            None => defaults.view_name_translator()?,
        };
        let locale_resolver = match self.locale_resolver {
            Some(l) => l,
            None => defaults
                .locale_resolver()?
                .unwrap_or_else(|| Arc::new(AcceptHeaderLocaleResolver::new())),
        };
        let flash_manager = match self.flash_manager {
            Some(m) => Some(m),
            None => defaults.flash_map_manager(config.flash_map_timeout())?,
        };

        debug!(
            mappings = mappings.len(),
            adapters = adapters.len(),
            exception_resolvers = exception_resolvers.len(),
            view_resolvers = view_resolvers.len(),
            "Dispatcher initialized"
        );

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                config,
                mappings,
                adapters,
                exception_resolvers,
                view_resolvers,
                name_translator,
                locale_resolver,
                flash_manager,
                multipart: self.multipart,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Controller, Handler};
    use crate::mapping::{BestMatchingPattern, UrlHandlerMapping};
    use crate::registry::StaticHandlerRegistry;
    use async_trait::async_trait;

    struct Show;

    #[async_trait]
    impl Controller for Show {
        async fn handle(
            &self,
            request: &mut HttpRequest,
            _response: &mut HttpResponse,
        ) -> Result<HandlerOutcome> {
            let id = request.param("id").cloned().unwrap_or_default();
            Ok(DispatchResult::new().with_attribute("id", id)?.into())
        }
    }

    fn dispatcher_with(pattern: &str, handler: Handler) -> Dispatcher {
        let mut mapping = UrlHandlerMapping::new();
        mapping.register_handler(pattern, handler).unwrap();
        Dispatcher::builder().mapping(mapping).build().unwrap()
    }

    #[tokio::test]
    async fn test_renders_default_view_with_path_params() {
        let dispatcher = dispatcher_with("/items/{id}", Handler::controller("show", Show));
        let mut req = HttpRequest::new("GET", "/items/42");
        let mut res = HttpResponse::ok();

        dispatcher.dispatch(&mut req, &mut res).await.unwrap();
        assert_eq!(res.body_string(), r#"{"id":"42"}"#);
        assert_eq!(res.header("Content-Language"), Some("en"));
        assert_eq!(req.attribute::<BestMatchingPattern>().unwrap().0, "/items/{id}");
        assert!(req.attribute::<CurrentLocale>().is_some());
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let dispatcher = dispatcher_with("/items/{id}", Handler::controller("show", Show));
        let mut req = HttpRequest::new("GET", "/nothing");
        let mut res = HttpResponse::ok();
        dispatcher.dispatch(&mut req, &mut res).await.unwrap();
        assert_eq!(res.status, 404);
        assert!(res.is_committed());
    }

    #[tokio::test]
    async fn test_no_adapter_is_fatal() {
        let dispatcher = dispatcher_with("/odd", Handler::new("odd", 7u32));
        let mut req = HttpRequest::new("GET", "/odd");
        let mut res = HttpResponse::ok();
        let err = dispatcher.dispatch(&mut req, &mut res).await.unwrap_err();
        assert!(matches!(err, Error::NoAdapter(_)));
    }

    #[tokio::test]
    async fn test_registry_detection_when_no_mapping() {
        let registry = Arc::new(StaticHandlerRegistry::new());
        registry.register(Handler::from_fn("/ping", |_req| async {
            Ok(HttpResponse::ok().with_body(b"pong".to_vec()))
        }));
        let dispatcher = Dispatcher::builder().registry(registry).build().unwrap();
        assert_eq!(dispatcher.mappings().len(), 1);

        let mut req = HttpRequest::new("GET", "/ping");
        let mut res = HttpResponse::ok();
        dispatcher.dispatch(&mut req, &mut res).await.unwrap();
        assert_eq!(res.body_string(), "pong");
    }

    #[tokio::test]
    async fn test_only_first_mapping_without_detect_all() {
        let mut first = UrlHandlerMapping::new().with_order(1);
        first
            .register_handler("/a", Handler::controller("a", Show))
            .unwrap();
        let mut second = UrlHandlerMapping::new().with_order(2);
        second
            .register_handler("/b", Handler::controller("b", Show))
            .unwrap();

        let dispatcher = Dispatcher::builder()
            .mapping(second)
            .mapping(first)
            .detect_all_handler_mappings(false)
            .build()
            .unwrap();
        assert_eq!(dispatcher.mappings().len(), 1);

        let mut res = HttpResponse::ok();
        dispatcher
            .dispatch(&mut HttpRequest::new("GET", "/b"), &mut res)
            .await
            .unwrap();
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_unresolvable_view_is_fatal() {
        let dispatcher = Dispatcher::builder()
            .mapping({
                let mut m = UrlHandlerMapping::new();
                m.register_handler("/page", Handler::controller("page", Show)).unwrap();
                m
            })
            .view_resolver(crate::view::StaticViewResolver::new())
            .build()
            .unwrap();
        let mut res = HttpResponse::ok();
        let err = dispatcher
            .dispatch(&mut HttpRequest::new("GET", "/page"), &mut res)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ViewResolution(_)));
    }
}
