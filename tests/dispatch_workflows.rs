//! Integration tests for common switchyard workflows.
//!
//! These drive the facade crate end to end through the testing client.

use std::sync::Arc;
use std::time::Duration;
use switchyard::prelude::*;
use switchyard::{
    FixedLocaleResolver, JsonViewResolver, Locale, MappingExceptionResolver, RedirectViewResolver,
    StaticViewResolver, StatusCodeResolver, TextView,
};
use switchyard_testing::{
    CallLog, RecordingInterceptor, StubController, TestAppBuilder, TestRequestBuilder,
    assert_body_contains, assert_error_kind, assert_header, assert_json, assert_status,
};

// =============================================================================
// Interceptor chains
// =============================================================================

#[tokio::test]
async fn test_guard_interceptor_stops_the_request() {
    let log = CallLog::new();
    let handler = StubController::view("account", "account").logging_to(&log);
    let app = TestAppBuilder::new()
        .route("/account", handler.into_handler())
        .interceptor(RecordingInterceptor::new("trace", &log).into_arc())
        .interceptor(RecordingInterceptor::new("auth", &log).halting(401).into_arc())
        .interceptor(RecordingInterceptor::new("metrics", &log).into_arc())
        .build()
        .unwrap();

    let response = app.client().get("/account").await;
    assert_status(&response, 401);
    assert_body_contains(&response, "halted by auth");
    assert_eq!(
        log.calls(),
        vec!["trace.before", "auth.before", "auth.completion", "trace.completion"]
    );
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_errors_map_to_status_codes_by_default() {
    let app = TestAppBuilder::new()
        .route(
            "/orders/{id}",
            StubController::failing("order", || Error::NotFound("order 7".into())).into_handler(),
        )
        .build()
        .unwrap();

    let response = app.client().get("/orders/7").await;
    assert_status(&response, 404);
}

#[tokio::test]
async fn test_error_views_and_fallthrough() {
    let app = TestAppBuilder::new()
        .route(
            "/conflict",
            StubController::failing("conflict", || Error::Conflict("stale".into())).into_handler(),
        )
        .route(
            "/broken",
            StubController::failing("broken", || Error::Handler("bug".into())).into_handler(),
        )
        .configure(|builder| {
            builder
                .exception_resolver(
                    MappingExceptionResolver::new()
                        .map_kind("Conflict", "errors/conflict")
                        .status_for_view("errors/conflict", 409),
                )
                .exception_resolver(StatusCodeResolver::new())
        })
        .build()
        .unwrap();
    let client = app.client();

    let response = client.get("/conflict").await;
    assert_status(&response, 409);
    let body: serde_json::Value = response.body_json().unwrap();
    assert_eq!(body["error_kind"], "Conflict");

    assert_error_kind(&client.get("/broken").await, "Handler");
}

#[tokio::test]
async fn test_unmatched_requests_can_raise() {
    let app = TestAppBuilder::new()
        .route("/known", StubController::text("known", "ok").into_handler())
        .configure(|builder| builder.throw_if_no_handler_found(true))
        .build()
        .unwrap();

    assert_error_kind(&app.client().get("/unknown").await, "NoHandlerFound");
}

// =============================================================================
// Views
// =============================================================================

#[tokio::test]
async fn test_localized_text_view() {
    let app = TestAppBuilder::new()
        .route(
            "/welcome",
            StubController::view("welcome", "welcome")
                .attribute("name", serde_json::json!("Ada"))
                .into_handler(),
        )
        .configure(|builder| {
            builder
                .view_resolver(
                    StaticViewResolver::new()
                        .with_view("welcome", TextView::new("welcome", "Hello, {name}!"))
                        .with_localized_view(
                            "welcome",
                            "fr",
                            TextView::new("welcome", "Bonjour, {name} !"),
                        ),
                )
                .view_resolver(JsonViewResolver::new())
        })
        .build()
        .unwrap();
    let client = app.client();

    let french = TestRequestBuilder::new("GET", "/welcome")
        .header("Accept-Language", "fr-CA,fr;q=0.9,en;q=0.5")
        .build();
    let response = client.send(french).await;
    assert_eq!(response.body_string().as_deref(), Some("Bonjour, Ada !"));
    assert_header(&response, "Content-Language", "fr-CA");

    let response = client.get("/welcome").await;
    assert_eq!(response.body_string().as_deref(), Some("Hello, Ada!"));
    assert_header(&response, "Content-Type", "text/plain; charset=utf-8");
}

#[tokio::test]
async fn test_fixed_locale() {
    let app = TestAppBuilder::new()
        .route("/page", StubController::view("page", "page").into_handler())
        .configure(|builder| {
            builder.locale_resolver(FixedLocaleResolver(Locale::new("de", Some("AT"))))
        })
        .build()
        .unwrap();

    let request = TestRequestBuilder::new("GET", "/page")
        .header("Accept-Language", "en-US")
        .build();
    assert_header(&app.client().send(request).await, "Content-Language", "de-AT");
}

#[tokio::test]
async fn test_view_name_from_request_path() {
    struct Report;

    #[async_trait]
    impl Controller for Report {
        async fn handle(
            &self,
            request: &mut HttpRequest,
            _response: &mut HttpResponse,
        ) -> Result<HandlerOutcome> {
            let year = request.param("year").cloned().unwrap_or_default();
            Ok(DispatchResult::new().with_attribute("year", year)?.into())
        }
    }

    let app = TestAppBuilder::new()
        .route("/reports/{year}.html", Handler::controller("report", Report))
        .configure(|builder| {
            builder.view_resolver(
                StaticViewResolver::new()
                    .with_view("reports/2024", TextView::new("report", "Annual report {year}")),
            )
        })
        .build()
        .unwrap();

    let response = app.client().get("/reports/2024.html").await;
    assert_status(&response, 200);
    assert_eq!(response.body_string().as_deref(), Some("Annual report 2024"));
}

#[tokio::test]
async fn test_redirect_exposes_model_as_query() {
    let app = TestAppBuilder::new()
        .route(
            "/search",
            StubController::view("search", "redirect:/results")
                .attribute("q", serde_json::json!("rust lang"))
                .into_handler(),
        )
        .configure(|builder| {
            builder
                .view_resolver(RedirectViewResolver::new().http10_compatible(false))
                .view_resolver(JsonViewResolver::new())
        })
        .build()
        .unwrap();

    let request = TestRequestBuilder::new("POST", "/search")
        .context_path("/app")
        .build();
    let response = app.client().send(request).await;
    assert_status(&response, 303);
    assert_header(&response, "Location", "/app/results?q=rust%20lang");
}

// =============================================================================
// Asynchronous handlers
// =============================================================================

#[tokio::test]
async fn test_async_handler_is_resumed() {
    struct Slow;

    #[async_trait]
    impl Controller for Slow {
        async fn handle(
            &self,
            _request: &mut HttpRequest,
            _response: &mut HttpResponse,
        ) -> Result<HandlerOutcome> {
            Ok(HandlerOutcome::Pending(Continuation::from_future(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                DispatchResult::view_name("slow")
                    .with_attribute("done", true)
                    .map(Some)
            })))
        }
    }

    let log = CallLog::new();
    let app = TestAppBuilder::new()
        .route("/slow", Handler::controller("slow", Slow))
        .interceptor(RecordingInterceptor::new("timing", &log).into_arc())
        .build()
        .unwrap();

    let response = app.client().get("/slow").await;
    assert_json(&response, &serde_json::json!({"done": true}));
    assert_eq!(
        log.calls(),
        vec!["timing.before", "timing.async", "timing.after", "timing.completion"]
    );
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_dispatcher_from_config_document() {
    use switchyard_config::{FileFormat, InterceptorCatalog, SwitchyardConfig};

    let registry = Arc::new(switchyard::StaticHandlerRegistry::new());
    registry.register(StubController::text("status", "up").into_handler());

    let config = SwitchyardConfig::parse(
        r#"{"routes": {"paths": {"/health/**": "status"}}}"#,
        FileFormat::Json,
    )
    .unwrap();
    let dispatcher = config
        .dispatcher_builder(registry, &InterceptorCatalog::new())
        .unwrap()
        .build()
        .unwrap();

    let response = switchyard_testing::TestClient::new(dispatcher)
        .get("/health/live")
        .await;
    assert_status(&response, 200);
    assert_eq!(response.body_string().as_deref(), Some("up"));
}
