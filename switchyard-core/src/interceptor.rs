//! Handler interceptors and execution chains.
//!
//! An interceptor gets three hooks around handler invocation:
//!
//! - [`before`](HandlerInterceptor::before) runs in chain order and may halt
//!   dispatch by returning [`Flow::Halt`]
//! - [`after`](HandlerInterceptor::after) runs once the handler produced a
//!   result, in chain order, and may adjust the result
//! - [`completion`](HandlerInterceptor::completion) runs exactly once per
//!   interceptor whose `before` was invoked, in reverse order, whatever the
//!   outcome
//!
//! [`InterceptorRegistry`] composes the per-request chain from global and
//! path-scoped registrations.

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::{debug, trace, warn};
use crate::path_matcher::AntPathMatcher;
use crate::result::DispatchResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Decision returned by [`HandlerInterceptor::before`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop dispatch; the interceptor is assumed to have written the response.
    Halt,
}

/// Hooks around handler invocation.
#[async_trait]
pub trait HandlerInterceptor: Send + Sync + 'static {
    async fn before(
        &self,
        _request: &mut HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    /// `result` is `None` when the handler wrote the response itself.
    async fn after(
        &self,
        _request: &mut HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
        _result: Option<&mut DispatchResult>,
    ) -> Result<()> {
        Ok(())
    }

    /// Errors returned here are logged and otherwise ignored.
    async fn completion(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
        _error: Option<&Error>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called instead of `after` and `completion` when the handler deferred
    /// its result; those run when the suspended dispatch is resumed.
    async fn concurrent_handling_started(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Which `before` hooks of a chain ran, and whether completion fired.
///
/// Kept per request by the dispatcher; the chain itself stays immutable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookProgress {
    invoked: usize,
    completed: bool,
}

impl HookProgress {
    /// Number of interceptors whose `before` was invoked.
    pub fn invoked(&self) -> usize {
        self.invoked
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// A handler plus its ordered interceptors for one request.
///
/// Route tables also attach the request attributes describing the match
/// (pattern, template variables); the dispatcher publishes them on the
/// request before any hook runs.
#[derive(Clone)]
pub struct ExecutionChain {
    handler: Handler,
    interceptors: Vec<Arc<dyn HandlerInterceptor>>,
    exposed: Attributes,
}

impl ExecutionChain {
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            interceptors: Vec::new(),
            exposed: Attributes::new(),
        }
    }

    /// Attach an attribute to publish on the request.
    pub fn expose<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.exposed.insert(value);
        self
    }

    pub fn exposed(&self) -> &Attributes {
        &self.exposed
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = Arc<dyn HandlerInterceptor>>,
    ) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    /// Same chain with `interceptor` first.
    pub fn prepend(mut self, interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        self.interceptors.insert(0, interceptor);
        self
    }

    /// Same interceptors around a different handler.
    pub fn replace_handler(mut self, handler: Handler) -> Self {
        self.handler = handler;
        self
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn interceptors(&self) -> &[Arc<dyn HandlerInterceptor>] {
        &self.interceptors
    }

    pub fn same_as(&self, other: &ExecutionChain) -> bool {
        self.handler.same_as(&other.handler)
            && self.interceptors.len() == other.interceptors.len()
            && self
                .interceptors
                .iter()
                .zip(&other.interceptors)
                .all(|(a, b)| std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)))
    }

    /// Run `before` hooks in order.
    ///
    /// On [`Flow::Halt`] completion is triggered right away for every
    /// interceptor whose `before` was invoked, including the halting one.
    pub async fn apply_before(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        progress: &mut HookProgress,
    ) -> Result<Flow> {
        for (idx, interceptor) in self.interceptors.iter().enumerate() {
            progress.invoked = idx + 1;
            trace!(interceptor = interceptor.name(), "before hook");
            if interceptor.before(request, response, &self.handler).await? == Flow::Halt {
                debug!(
                    interceptor = interceptor.name(),
                    handler = self.handler.name(),
                    "Dispatch halted by interceptor"
                );
                self.trigger_completion(request, response, progress, None).await;
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Continue)
    }

    /// Run `after` hooks in chain order.
    pub async fn apply_after(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        mut result: Option<&mut DispatchResult>,
    ) -> Result<()> {
        for interceptor in &self.interceptors {
            trace!(interceptor = interceptor.name(), "after hook");
            interceptor
                .after(request, response, &self.handler, result.as_deref_mut())
                .await?;
        }
        Ok(())
    }

    /// Run `completion` hooks in reverse order for every interceptor whose
    /// `before` was invoked. Later calls for the same progress are no-ops.
    pub async fn trigger_completion(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        progress: &mut HookProgress,
        error: Option<&Error>,
    ) {
        if progress.completed {
            return;
        }
        progress.completed = true;

        for interceptor in self.interceptors[..progress.invoked].iter().rev() {
            trace!(interceptor = interceptor.name(), "completion hook");
            if let Err(e) = interceptor
                .completion(request, response, &self.handler, error)
                .await
            {
                warn!(
                    interceptor = interceptor.name(),
                    error = %e,
                    "Completion hook failed"
                );
            }
        }
    }

    /// Notify every interceptor that the handler deferred its result.
    pub async fn apply_concurrent_handling_started(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) {
        for interceptor in self.interceptors.iter().rev() {
            if let Err(e) = interceptor
                .concurrent_handling_started(request, response, &self.handler)
                .await
            {
                warn!(
                    interceptor = interceptor.name(),
                    error = %e,
                    "Async-started hook failed"
                );
            }
        }
    }
}

impl fmt::Debug for ExecutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("ExecutionChain")
            .field("handler", &self.handler.name())
            .field("interceptors", &names)
            .finish()
    }
}

/// An interceptor that applies only to some lookup paths.
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard_core::{AntPathMatcher, LoggingInterceptor, MappedInterceptor};
///
/// let mapped = MappedInterceptor::new(Arc::new(LoggingInterceptor))
///     .include("/api/**")
///     .exclude("/api/health");
///
/// let matcher = AntPathMatcher::new();
/// assert!(mapped.matches("/api/users", &matcher));
/// assert!(!mapped.matches("/api/health", &matcher));
/// assert!(!mapped.matches("/admin", &matcher));
/// ```
#[derive(Clone)]
pub struct MappedInterceptor {
    includes: Vec<String>,
    excludes: Vec<String>,
    interceptor: Arc<dyn HandlerInterceptor>,
}

impl MappedInterceptor {
    pub fn new(interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
            interceptor,
        }
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.includes
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.excludes
    }

    pub fn interceptor(&self) -> &Arc<dyn HandlerInterceptor> {
        &self.interceptor
    }

    /// Excludes win; an empty include list matches every path.
    pub fn matches(&self, lookup_path: &str, matcher: &AntPathMatcher) -> bool {
        if self.excludes.iter().any(|p| matcher.matches(p, lookup_path)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|p| matcher.matches(p, lookup_path))
    }
}

#[derive(Clone)]
enum Registration {
    Global(Arc<dyn HandlerInterceptor>),
    Mapped(MappedInterceptor),
}

/// Ordered interceptor registrations; builds per-request chains.
///
/// Global and path-scoped registrations share one list, so they interleave
/// in the chain exactly as registered.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    registrations: Vec<Registration>,
    matcher: Arc<AntPathMatcher>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher(mut self, matcher: Arc<AntPathMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Register an interceptor for every request.
    pub fn add(&mut self, interceptor: Arc<dyn HandlerInterceptor>) -> &mut Self {
        self.registrations.push(Registration::Global(interceptor));
        self
    }

    pub fn add_mapped(&mut self, mapped: MappedInterceptor) -> &mut Self {
        self.registrations.push(Registration::Mapped(mapped));
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Chain for `handler` at `lookup_path`.
    pub fn build(&self, handler: Handler, lookup_path: &str) -> ExecutionChain {
        self.extend(ExecutionChain::new(handler), lookup_path)
    }

    /// Append the applicable registrations to an existing chain.
    pub fn extend(&self, chain: ExecutionChain, lookup_path: &str) -> ExecutionChain {
        let applicable = self.registrations.iter().filter_map(|r| match r {
            Registration::Global(i) => Some(Arc::clone(i)),
            Registration::Mapped(m) if m.matches(lookup_path, &self.matcher) => {
                Some(Arc::clone(m.interceptor()))
            }
            Registration::Mapped(_) => None,
        });
        chain.with_interceptors(applicable)
    }
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

struct RequestStarted(Instant);

/// Logs each dispatch and its duration through `tracing`.
pub struct LoggingInterceptor;

#[async_trait]
impl HandlerInterceptor for LoggingInterceptor {
    async fn before(
        &self,
        request: &mut HttpRequest,
        _response: &mut HttpResponse,
        handler: &Handler,
    ) -> Result<Flow> {
        debug!(
            method = %request.method,
            path = %request.path,
            handler = handler.name(),
            "→ request"
        );
        request.attributes.insert(RequestStarted(Instant::now()));
        Ok(Flow::Continue)
    }

    async fn completion(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        _handler: &Handler,
        error: Option<&Error>,
    ) -> Result<()> {
        let elapsed = request.attribute::<RequestStarted>().map(|s| s.0.elapsed());
        match error {
            None => debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                elapsed = ?elapsed,
                "← response"
            ),
            Some(e) => debug!(
                method = %request.method,
                path = %request.path,
                error = %e,
                elapsed = ?elapsed,
                "← failed"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "LoggingInterceptor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recording {
        label: &'static str,
        halt: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HandlerInterceptor for Recording {
        async fn before(
            &self,
            _request: &mut HttpRequest,
            _response: &mut HttpResponse,
            _handler: &Handler,
        ) -> Result<Flow> {
            self.log.lock().push(format!("{}.before", self.label));
            Ok(if self.halt { Flow::Halt } else { Flow::Continue })
        }

        async fn completion(
            &self,
            _request: &HttpRequest,
            _response: &mut HttpResponse,
            _handler: &Handler,
            _error: Option<&Error>,
        ) -> Result<()> {
            self.log.lock().push(format!("{}.completion", self.label));
            Ok(())
        }
    }

    fn recording(label: &'static str, halt: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn HandlerInterceptor> {
        Arc::new(Recording {
            label,
            halt,
            log: Arc::clone(log),
        })
    }

    fn handler() -> Handler {
        Handler::from_fn("noop", |_req| async { Ok(HttpResponse::ok()) })
    }

    #[tokio::test]
    async fn test_halt_completes_only_invoked_interceptors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ExecutionChain::new(handler())
            .with_interceptor(recording("i1", false, &log))
            .with_interceptor(recording("i2", true, &log))
            .with_interceptor(recording("i3", false, &log));

        let mut req = HttpRequest::new("GET", "/");
        let mut res = HttpResponse::ok();
        let mut progress = HookProgress::default();
        let flow = chain.apply_before(&mut req, &mut res, &mut progress).await.unwrap();

        assert_eq!(flow, Flow::Halt);
        assert_eq!(
            *log.lock(),
            vec!["i1.before", "i2.before", "i2.completion", "i1.completion"]
        );
    }

    #[tokio::test]
    async fn test_completion_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ExecutionChain::new(handler()).with_interceptor(recording("i1", false, &log));
        let mut req = HttpRequest::new("GET", "/");
        let mut res = HttpResponse::ok();
        let mut progress = HookProgress::default();

        chain.apply_before(&mut req, &mut res, &mut progress).await.unwrap();
        chain.trigger_completion(&req, &mut res, &mut progress, None).await;
        chain.trigger_completion(&req, &mut res, &mut progress, None).await;

        assert_eq!(*log.lock(), vec!["i1.before", "i1.completion"]);
        assert!(progress.is_completed());
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let global1 = recording("g1", false, &log);
        let scoped = recording("scoped", false, &log);
        let global2 = recording("g2", false, &log);

        let mut registry = InterceptorRegistry::new();
        registry
            .add(Arc::clone(&global1))
            .add_mapped(MappedInterceptor::new(Arc::clone(&scoped)).include("/api/**"))
            .add(Arc::clone(&global2));

        let api = registry.build(handler(), "/api/users");
        assert_eq!(api.interceptors().len(), 3);
        assert!(std::ptr::addr_eq(Arc::as_ptr(&api.interceptors()[1]), Arc::as_ptr(&scoped)));

        let other = registry.build(handler(), "/home");
        assert_eq!(other.interceptors().len(), 2);
        assert!(std::ptr::addr_eq(Arc::as_ptr(&other.interceptors()[1]), Arc::as_ptr(&global2)));
    }

    #[test]
    fn test_mapped_excludes_win() {
        let matcher = AntPathMatcher::new();
        let mapped = MappedInterceptor::new(Arc::new(LoggingInterceptor))
            .include("/**")
            .exclude("/static/**");
        assert!(mapped.matches("/users", &matcher));
        assert!(!mapped.matches("/static/app.js", &matcher));
    }
}
