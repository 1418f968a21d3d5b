//! Handlers and handler references.
//!
//! A [`Handler`] is an opaque, shareable unit of application logic. The
//! dispatcher never calls it directly: a
//! [`HandlerAdapter`](crate::HandlerAdapter) that recognises its shape does.
//! Three shapes ship with the crate:
//!
//! - [`Controller`]: async, may return a [`DispatchResult`] to render or defer
//!   via [`HandlerOutcome::Pending`], may report a last-modified time
//! - [`HttpRequestHandler`]: writes the response itself
//! - [`HandlerFn`]: a closure from request to response
//!
//! Any other `Send + Sync` type can be wrapped with [`Handler::new`] and served
//! by a custom adapter.

use crate::cors::CorsConfig;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::interceptor::ExecutionChain;
use crate::result::DispatchResult;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::oneshot;

/// Closure handler producing a complete response.
pub type HandlerFn = Arc<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>
        + Send
        + Sync,
>;

/// Handler that may produce a result to render.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    async fn handle(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<HandlerOutcome>;

    /// Last modification time of the resource served for `request`, used to
    /// answer conditional GET/HEAD requests with 304.
    fn last_modified(&self, _request: &HttpRequest) -> Option<SystemTime> {
        None
    }
}

/// Handler that writes the response directly and renders nothing.
#[async_trait]
pub trait HttpRequestHandler: Send + Sync + 'static {
    async fn handle_request(&self, request: &HttpRequest, response: &mut HttpResponse)
    -> Result<()>;
}

/// Result of invoking a handler through its adapter.
pub enum HandlerOutcome {
    /// Finished; `None` means the response is complete and nothing is rendered.
    Ready(Option<DispatchResult>),
    /// Result production was handed to a background continuation.
    Pending(Continuation),
}

impl HandlerOutcome {
    /// Finished without anything to render.
    pub fn handled() -> Self {
        HandlerOutcome::Ready(None)
    }

    pub fn render(result: DispatchResult) -> Self {
        HandlerOutcome::Ready(Some(result))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, HandlerOutcome::Pending(_))
    }
}

impl From<DispatchResult> for HandlerOutcome {
    fn from(result: DispatchResult) -> Self {
        HandlerOutcome::Ready(Some(result))
    }
}

impl From<Continuation> for HandlerOutcome {
    fn from(continuation: Continuation) -> Self {
        HandlerOutcome::Pending(continuation)
    }
}

impl fmt::Debug for HandlerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOutcome::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            HandlerOutcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Deferred production of a handler's result.
///
/// ```rust
/// use switchyard_core::{Continuation, DispatchResult};
///
/// # tokio_test::block_on(async {
/// let (completer, continuation) = Continuation::channel();
/// tokio::spawn(async move {
///     completer.complete(Some(DispatchResult::view_name("report")));
/// });
/// let result = continuation.settle().await.unwrap();
/// assert_eq!(result.unwrap().view_name_str(), Some("report"));
/// # });
/// ```
pub struct Continuation {
    future: BoxFuture<'static, Result<Option<DispatchResult>>>,
}

impl Continuation {
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<DispatchResult>>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// A continuation settled from elsewhere through the returned [`Completer`].
    ///
    /// Dropping the completer without settling aborts the continuation with
    /// [`Error::AsyncAborted`].
    pub fn channel() -> (Completer, Continuation) {
        let (tx, rx) = oneshot::channel();
        let continuation = Continuation::from_future(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::AsyncAborted(
                    "completer dropped before the result was produced".to_string(),
                )),
            }
        });
        (Completer { tx }, continuation)
    }

    /// Wait for the continuation to settle.
    pub async fn settle(self) -> Result<Option<DispatchResult>> {
        self.future.await
    }
}

/// Sending half of [`Continuation::channel`].
pub struct Completer {
    tx: oneshot::Sender<Result<Option<DispatchResult>>>,
}

impl Completer {
    /// Settle with a result. Returns `false` if the dispatch was abandoned.
    pub fn complete(self, result: Option<DispatchResult>) -> bool {
        self.tx.send(Ok(result)).is_ok()
    }

    /// Settle with an error.
    pub fn fail(self, error: Error) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Whether the waiting dispatch was dropped.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Type-erased handler object.
///
/// Cloning is cheap and keeps identity: [`Handler::same_as`] compares the
/// underlying object, not the name.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    target: Arc<dyn Any + Send + Sync>,
    cors: Option<Arc<CorsConfig>>,
}

impl Handler {
    /// Wrap an arbitrary handler object served by a custom adapter.
    pub fn new<T: Any + Send + Sync>(name: impl Into<Arc<str>>, target: T) -> Self {
        Self {
            name: name.into(),
            target: Arc::new(target),
            cors: None,
        }
    }

    pub fn controller<C: Controller>(name: impl Into<Arc<str>>, controller: C) -> Self {
        Self::new(name, Arc::new(controller) as Arc<dyn Controller>)
    }

    pub fn request_handler<H: HttpRequestHandler>(name: impl Into<Arc<str>>, handler: H) -> Self {
        Self::new(name, Arc::new(handler) as Arc<dyn HttpRequestHandler>)
    }

    /// Closure handler.
    ///
    /// ```rust
    /// use switchyard_core::{Handler, HttpResponse};
    ///
    /// let health = Handler::from_fn("health", |_req| async move {
    ///     Ok(HttpResponse::ok().with_body(b"up".to_vec()))
    /// });
    /// assert_eq!(health.name(), "health");
    /// ```
    pub fn from_fn<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(
            move |req: HttpRequest| -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>> {
                Box::pin(f(req))
            },
        );
        Self::new(name, handler)
    }

    /// Attach a handler-specific CORS policy, merged with the global one.
    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.cors = Some(Arc::new(config));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cors_config(&self) -> Option<&CorsConfig> {
        self.cors.as_deref()
    }

    /// Borrow the wrapped object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.target.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.target.is::<T>()
    }

    /// `TypeId` of the wrapped object, the key for adapter caching.
    pub fn target_type_id(&self) -> TypeId {
        Any::type_id(&*self.target)
    }

    /// Whether both handles wrap the same object.
    pub fn same_as(&self, other: &Handler) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.target), Arc::as_ptr(&other.target))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("cors", &self.cors.is_some())
            .finish()
    }
}

/// What a route table stores for a pattern.
#[derive(Clone, Debug)]
pub enum HandlerRef {
    /// Name to resolve through a [`HandlerRegistry`](crate::HandlerRegistry).
    Unresolved(String),
    Resolved(Handler),
    /// A pre-built chain whose interceptors run before the mapping's own.
    Chain(ExecutionChain),
}

impl HandlerRef {
    pub fn named(name: impl Into<String>) -> Self {
        HandlerRef::Unresolved(name.into())
    }

    /// Identity used for duplicate registration checks.
    pub fn same_as(&self, other: &HandlerRef) -> bool {
        match (self, other) {
            (HandlerRef::Unresolved(a), HandlerRef::Unresolved(b)) => a == b,
            (HandlerRef::Resolved(a), HandlerRef::Resolved(b)) => a.same_as(b),
            (HandlerRef::Chain(a), HandlerRef::Chain(b)) => a.same_as(b),
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            HandlerRef::Unresolved(name) => format!("'{}'", name),
            HandlerRef::Resolved(handler) => format!("[{}]", handler.name()),
            HandlerRef::Chain(chain) => format!("chain [{}]", chain.handler().name()),
        }
    }
}

impl From<Handler> for HandlerRef {
    fn from(handler: Handler) -> Self {
        HandlerRef::Resolved(handler)
    }
}

impl From<ExecutionChain> for HandlerRef {
    fn from(chain: ExecutionChain) -> Self {
        HandlerRef::Chain(chain)
    }
}
