// Tests for the dispatcher lifecycle

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use switchyard_core::{
    Attributes, BestMatchingPattern, Completer, Continuation, Controller, CorsConfig,
    DispatchResult, DispatchType, Dispatched, Dispatcher, Error, ExceptionResolver, Flow, Handler,
    HandlerInterceptor, HandlerOutcome, HttpRequest, HttpResponse, InputFlashMap,
    MappingExceptionResolver, OutputFlashMap, Result, StandardMultipartResolver,
    StatusCodeResolver, UrlHandlerMapping,
};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

struct Recorder {
    label: &'static str,
    halt: bool,
    log: CallLog,
}

fn recorder(label: &'static str, log: &CallLog) -> Arc<dyn HandlerInterceptor> {
    Arc::new(Recorder {
        label,
        halt: false,
        log: log.clone(),
    })
}

fn halting(label: &'static str, log: &CallLog) -> Arc<dyn HandlerInterceptor> {
    Arc::new(Recorder {
        label,
        halt: true,
        log: log.clone(),
    })
}

#[async_trait]
impl HandlerInterceptor for Recorder {
    async fn before(
        &self,
        _request: &mut HttpRequest,
        response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<Flow> {
        self.log.push(format!("{}.before", self.label));
        if self.halt {
            response.send_error(401, "halted");
            return Ok(Flow::Halt);
        }
        Ok(Flow::Continue)
    }

    async fn after(
        &self,
        _request: &mut HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
        _result: Option<&mut DispatchResult>,
    ) -> Result<()> {
        self.log.push(format!("{}.after", self.label));
        Ok(())
    }

    async fn completion(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
        error: Option<&Error>,
    ) -> Result<()> {
        let marker = if error.is_some() { "!" } else { "" };
        self.log.push(format!("{}.completion{}", self.label, marker));
        Ok(())
    }

    async fn concurrent_handling_started(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<()> {
        self.log.push(format!("{}.async", self.label));
        Ok(())
    }

    fn name(&self) -> &str {
        self.label
    }
}

/// Renders `page` with the request path in the model.
struct Page {
    log: CallLog,
}

#[async_trait]
impl Controller for Page {
    async fn handle(
        &self,
        request: &mut HttpRequest,
        _response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        self.log.push("handler".to_string());
        Ok(DispatchResult::view_name("page")
            .with_attribute("path", &request.path)?
            .into())
    }
}

/// Fails with the error built by `make`.
struct Failing {
    make: fn() -> Error,
}

#[async_trait]
impl Controller for Failing {
    async fn handle(
        &self,
        _request: &mut HttpRequest,
        _response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        Err((self.make)())
    }
}

/// Defers its result to whoever takes the completer.
#[derive(Clone, Default)]
struct Deferred {
    slot: Arc<Mutex<Option<Completer>>>,
}

#[async_trait]
impl Controller for Deferred {
    async fn handle(
        &self,
        _request: &mut HttpRequest,
        _response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        let (completer, continuation) = Continuation::channel();
        *self.slot.lock() = Some(completer);
        Ok(HandlerOutcome::Pending(continuation))
    }
}

/// Document whose last modification is fixed.
struct Document {
    modified: SystemTime,
}

#[async_trait]
impl Controller for Document {
    async fn handle(
        &self,
        _request: &mut HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        response.write_text("document body");
        Ok(HandlerOutcome::handled())
    }

    fn last_modified(&self, _request: &HttpRequest) -> Option<SystemTime> {
        Some(self.modified)
    }
}

fn mapping_with(pattern: &str, handler: Handler) -> UrlHandlerMapping {
    let mut mapping = UrlHandlerMapping::new();
    mapping.register_handler(pattern, handler).unwrap();
    mapping
}

async fn run(dispatcher: &Dispatcher, req: &mut HttpRequest) -> (Result<Dispatched>, HttpResponse) {
    let mut res = HttpResponse::ok();
    let outcome = dispatcher.dispatch(req, &mut res).await;
    (outcome, res)
}

// ============================================================================
// Interceptor ordering and completion
// ============================================================================

#[tokio::test]
async fn test_hooks_run_in_chain_order() {
    let log = CallLog::default();
    let mut mapping = mapping_with("/page", Handler::controller("page", Page { log: log.clone() }));
    for label in ["i1", "i2", "i3"] {
        mapping.support_mut().add_interceptor(recorder(label, &log));
    }
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let (outcome, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/page")).await;
    assert!(matches!(outcome, Ok(Dispatched::Completed)));
    assert_eq!(res.body_string(), r#"{"path":"/page"}"#);
    assert_eq!(
        log.entries(),
        vec![
            "i1.before", "i2.before", "i3.before", "handler", "i1.after", "i2.after", "i3.after",
            "i3.completion", "i2.completion", "i1.completion",
        ]
    );
}

#[tokio::test]
async fn test_halt_completes_invoked_interceptors_in_reverse() {
    let log = CallLog::default();
    let mut mapping = mapping_with("/page", Handler::controller("page", Page { log: log.clone() }));
    mapping.support_mut().add_interceptor(recorder("i1", &log));
    mapping.support_mut().add_interceptor(halting("i2", &log));
    mapping.support_mut().add_interceptor(recorder("i3", &log));
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let (outcome, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/page")).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 401);
    assert_eq!(
        log.entries(),
        vec!["i1.before", "i2.before", "i2.completion", "i1.completion"]
    );
}

#[tokio::test]
async fn test_completion_once_when_error_resolved() {
    let log = CallLog::default();
    let mut mapping = mapping_with(
        "/secret",
        Handler::controller("secret", Failing { make: || Error::Forbidden("no access".into()) }),
    );
    mapping.support_mut().add_interceptor(recorder("i1", &log));
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let (outcome, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/secret")).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 403);
    assert_eq!(log.entries(), vec!["i1.before", "i1.completion!"]);
}

#[tokio::test]
async fn test_completion_once_when_error_propagates() {
    let log = CallLog::default();
    let mut mapping = mapping_with(
        "/boom",
        Handler::controller("boom", Failing { make: || Error::Handler("exploded".into()) }),
    );
    mapping.support_mut().add_interceptor(recorder("i1", &log));
    mapping.support_mut().add_interceptor(recorder("i2", &log));
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let (outcome, _) = run(&dispatcher, &mut HttpRequest::new("GET", "/boom")).await;
    assert!(matches!(outcome, Err(Error::Handler(_))));
    assert_eq!(log.count("i1.completion!"), 1);
    assert_eq!(log.count("i2.completion!"), 1);
    assert_eq!(log.count("i1.after"), 0);
}

// ============================================================================
// Missing handlers and exception resolution
// ============================================================================

#[tokio::test]
async fn test_missing_handler_is_404_by_default() {
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/page", Handler::controller("page", Page { log: CallLog::default() })))
        .build()
        .unwrap();
    let (outcome, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/missing")).await;
    assert!(matches!(outcome, Ok(Dispatched::Completed)));
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn test_missing_handler_raises_in_throw_mode() {
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/page", Handler::controller("page", Page { log: CallLog::default() })))
        .throw_if_no_handler_found(true)
        .build()
        .unwrap();
    let (outcome, _) = run(&dispatcher, &mut HttpRequest::new("DELETE", "/missing")).await;
    match outcome {
        Err(Error::NoHandlerFound { method, path }) => {
            assert_eq!(method, "DELETE");
            assert_eq!(path, "/missing");
        }
        other => panic!("expected NoHandlerFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_handler_resolved_to_error_view() {
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/page", Handler::controller("page", Page { log: CallLog::default() })))
        .throw_if_no_handler_found(true)
        .exception_resolver(
            MappingExceptionResolver::new()
                .map_kind("NoHandlerFound", "errors/missing")
                .status_for_view("errors/missing", 404),
        )
        .build()
        .unwrap();

    let (outcome, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/missing")).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 404);
    let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(body["error_kind"], "NoHandlerFound");
}

struct Probe {
    label: &'static str,
    answers: bool,
    order: i32,
    log: CallLog,
}

#[async_trait]
impl ExceptionResolver for Probe {
    async fn resolve(
        &self,
        _request: &HttpRequest,
        response: &mut HttpResponse,
        _handler: Option<&Handler>,
        _error: &Error,
    ) -> Option<DispatchResult> {
        self.log.push(self.label.to_string());
        if self.answers {
            response.send_error(418, self.label);
            Some(DispatchResult::empty())
        } else {
            None
        }
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[tokio::test]
async fn test_resolver_chain_short_circuits() {
    let log = CallLog::default();
    let probe = |label, answers, order| Probe {
        label,
        answers,
        order,
        log: log.clone(),
    };
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with(
            "/boom",
            Handler::controller("boom", Failing { make: || Error::Handler("x".into()) }),
        ))
        .exception_resolver(probe("third", true, 3))
        .exception_resolver(probe("first", false, 1))
        .exception_resolver(probe("second", true, 2))
        .build()
        .unwrap();

    let (outcome, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/boom")).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 418);
    assert_eq!(log.entries(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_fatal_errors_skip_resolvers() {
    let log = CallLog::default();
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/odd", Handler::new("odd", "not a handler")))
        .exception_resolver(Probe {
            label: "probe",
            answers: true,
            order: 0,
            log: log.clone(),
        })
        .build()
        .unwrap();

    let (outcome, _) = run(&dispatcher, &mut HttpRequest::new("GET", "/odd")).await;
    assert!(matches!(outcome, Err(Error::NoAdapter(_))));
    assert!(log.entries().is_empty());
}

// ============================================================================
// Asynchronous handling
// ============================================================================

#[tokio::test]
async fn test_suspend_and_resume() {
    let log = CallLog::default();
    let deferred = Deferred::default();
    let mut mapping = mapping_with("/report", Handler::controller("report", deferred.clone()));
    mapping.support_mut().add_interceptor(recorder("i1", &log));
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let mut req = HttpRequest::new("GET", "/report");
    let mut res = HttpResponse::ok();
    let outcome = dispatcher.dispatch(&mut req, &mut res).await.unwrap();
    assert!(outcome.is_suspended());
    assert_eq!(log.entries(), vec!["i1.before", "i1.async"]);

    let completer = deferred.slot.lock().take().unwrap();
    tokio::spawn(async move {
        let result = DispatchResult::view_name("report").with_attribute("rows", 3).unwrap();
        completer.complete(Some(result));
    });

    outcome
        .into_async()
        .unwrap()
        .resume(&mut req, &mut res)
        .await
        .unwrap();
    assert_eq!(res.body_string(), r#"{"rows":3}"#);
    assert_eq!(
        log.entries(),
        vec!["i1.before", "i1.async", "i1.after", "i1.completion"]
    );
}

#[tokio::test]
async fn test_aborted_continuation_still_completes() {
    let log = CallLog::default();
    let deferred = Deferred::default();
    let mut mapping = mapping_with("/report", Handler::controller("report", deferred.clone()));
    mapping.support_mut().add_interceptor(recorder("i1", &log));
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let mut req = HttpRequest::new("GET", "/report");
    let mut res = HttpResponse::ok();
    let pending = dispatcher
        .dispatch(&mut req, &mut res)
        .await
        .unwrap()
        .into_async()
        .unwrap();
    drop(deferred.slot.lock().take());

    let err = pending.resume(&mut req, &mut res).await.unwrap_err();
    assert!(matches!(err, Error::AsyncAborted(_)));
    assert_eq!(log.count("i1.completion!"), 1);
    assert_eq!(log.count("i1.after"), 0);
}

// ============================================================================
// Conditional requests
// ============================================================================

#[tokio::test]
async fn test_not_modified_skips_hooks_and_handler() {
    let log = CallLog::default();
    let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let mut mapping = mapping_with("/doc", Handler::controller("doc", Document { modified }));
    mapping.support_mut().add_interceptor(recorder("i1", &log));
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let since = httpdate::fmt_http_date(modified + Duration::from_secs(60));
    let mut req = HttpRequest::new("GET", "/doc").with_header("If-Modified-Since", since);
    let (outcome, res) = run(&dispatcher, &mut req).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 304);
    assert!(res.body.is_empty());
    assert!(log.entries().is_empty());

    let mut post = HttpRequest::new("POST", "/doc")
        .with_header("If-Modified-Since", httpdate::fmt_http_date(modified));
    let (_, res) = run(&dispatcher, &mut post).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_string(), "document body");
}

// ============================================================================
// Include dispatches
// ============================================================================

#[derive(Debug)]
struct Marker(&'static str);

#[tokio::test]
async fn test_include_restores_attributes() {
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/fragment/{id}", Handler::controller("fragment", Page { log: CallLog::default() })))
        .build()
        .unwrap();

    let mut attributes = Attributes::new();
    attributes.insert(Marker("outer"));
    attributes.insert(BestMatchingPattern("/outer/**".to_string()));
    let mut req = HttpRequest::new("GET", "/fragment/7").with_dispatch_type(DispatchType::Include);
    req.attributes = attributes;

    let (outcome, _) = run(&dispatcher, &mut req).await;
    assert!(outcome.is_ok());
    assert_eq!(req.attribute::<Marker>().unwrap().0, "outer");
    assert_eq!(req.attribute::<BestMatchingPattern>().unwrap().0, "/outer/**");
    assert!(req.attribute::<OutputFlashMap>().is_none());
}

#[tokio::test]
async fn test_plain_request_keeps_match_attributes() {
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/fragment/{id}", Handler::controller("fragment", Page { log: CallLog::default() })))
        .build()
        .unwrap();
    let mut req = HttpRequest::new("GET", "/fragment/7");
    run(&dispatcher, &mut req).await.0.unwrap();
    assert_eq!(req.attribute::<BestMatchingPattern>().unwrap().0, "/fragment/{id}");
    assert_eq!(req.param("id").map(String::as_str), Some("7"));
}

// ============================================================================
// CORS
// ============================================================================

fn cors_dispatcher(log: &CallLog) -> Dispatcher {
    let handler = Handler::controller("api", Page { log: log.clone() }).with_cors(
        CorsConfig::new()
            .allow_origin("https://app.example")
            .allow_methods(vec!["GET", "PUT"]),
    );
    let mut mapping = mapping_with("/api/**", handler);
    mapping.support_mut().add_interceptor(recorder("i1", log));
    Dispatcher::builder().mapping(mapping).build().unwrap()
}

#[tokio::test]
async fn test_preflight_bypasses_real_handler() {
    let log = CallLog::default();
    let dispatcher = cors_dispatcher(&log);
    let mut req = HttpRequest::new("OPTIONS", "/api/items")
        .with_header("Origin", "https://app.example")
        .with_header("Access-Control-Request-Method", "PUT");

    let (outcome, res) = run(&dispatcher, &mut req).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 204);
    assert_eq!(res.header("Access-Control-Allow-Origin"), Some("https://app.example"));
    assert_eq!(res.header("Access-Control-Allow-Methods"), Some("PUT"));
    assert_eq!(log.count("handler"), 0);
    assert_eq!(log.count("i1.before"), 1);
    assert_eq!(log.count("i1.completion"), 1);
}

#[tokio::test]
async fn test_rejected_cross_origin_request() {
    let log = CallLog::default();
    let dispatcher = cors_dispatcher(&log);
    let mut req = HttpRequest::new("GET", "/api/items").with_header("Origin", "https://evil.example");

    let (outcome, res) = run(&dispatcher, &mut req).await;
    assert!(outcome.is_ok());
    assert_eq!(res.status, 403);
    assert_eq!(res.body_string(), "Invalid CORS request");
    assert_eq!(log.count("handler"), 0);
    assert_eq!(log.count("i1.before"), 0);
}

#[tokio::test]
async fn test_allowed_cross_origin_request() {
    let log = CallLog::default();
    let dispatcher = cors_dispatcher(&log);
    let mut req = HttpRequest::new("GET", "/api/items").with_header("Origin", "https://app.example");

    let (_, res) = run(&dispatcher, &mut req).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("Access-Control-Allow-Origin"), Some("https://app.example"));
    assert_eq!(log.count("handler"), 1);
}

// ============================================================================
// Flash attributes across a redirect
// ============================================================================

struct Submit;

#[async_trait]
impl Controller for Submit {
    async fn handle(
        &self,
        request: &mut HttpRequest,
        _response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        if let Some(output) = request.attribute::<OutputFlashMap>() {
            output.put("notice", "saved")?;
        }
        Ok(DispatchResult::view_name("redirect:/done").into())
    }
}

struct Done;

#[async_trait]
impl Controller for Done {
    async fn handle(
        &self,
        request: &mut HttpRequest,
        _response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        let notice = request
            .attribute::<InputFlashMap>()
            .and_then(|flash| flash.0.get("notice").cloned())
            .unwrap_or(serde_json::Value::Null);
        Ok(DispatchResult::view_name("done").with_attribute("notice", notice)?.into())
    }
}

#[tokio::test]
async fn test_flash_attributes_survive_redirect() {
    let mut mapping = UrlHandlerMapping::new();
    mapping.register_handler("/submit", Handler::controller("submit", Submit)).unwrap();
    mapping.register_handler("/done", Handler::controller("done", Done)).unwrap();
    let dispatcher = Dispatcher::builder().mapping(mapping).build().unwrap();

    let (_, res) = run(&dispatcher, &mut HttpRequest::new("POST", "/submit")).await;
    assert_eq!(res.status, 302);
    assert_eq!(res.header("Location"), Some("/done"));

    let (_, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/done")).await;
    assert_eq!(res.body_string(), r#"{"notice":"saved"}"#);

    let (_, res) = run(&dispatcher, &mut HttpRequest::new("GET", "/done")).await;
    assert_eq!(res.body_string(), r#"{"notice":null}"#);
}

// ============================================================================
// Multipart
// ============================================================================

fn broken_upload(dispatch_type: DispatchType) -> HttpRequest {
    HttpRequest::new("POST", "/page")
        .with_header("Content-Type", "multipart/form-data")
        .with_body(b"garbage".to_vec())
        .with_dispatch_type(dispatch_type)
}

#[tokio::test]
async fn test_multipart_failure_propagates() {
    let log = CallLog::default();
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/page", Handler::controller("page", Page { log: log.clone() })))
        .multipart_resolver(StandardMultipartResolver::new())
        .exception_resolver(StatusCodeResolver::new())
        .build()
        .unwrap();

    let (outcome, _) = run(&dispatcher, &mut broken_upload(DispatchType::Request)).await;
    assert!(matches!(outcome, Err(Error::Multipart(_))));
    assert_eq!(log.count("handler"), 0);
}

#[tokio::test]
async fn test_multipart_failure_tolerated_on_error_dispatch() {
    let log = CallLog::default();
    let dispatcher = Dispatcher::builder()
        .mapping(mapping_with("/page", Handler::controller("page", Page { log: log.clone() })))
        .multipart_resolver(StandardMultipartResolver::new())
        .build()
        .unwrap();

    let (outcome, _) = run(&dispatcher, &mut broken_upload(DispatchType::Error)).await;
    assert!(outcome.is_ok());
    assert_eq!(log.count("handler"), 1);
}
