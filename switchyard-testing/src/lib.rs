//! Testing utilities for switchyard dispatchers.
//!
//! - **TestAppBuilder** - routes plus interceptors into a ready dispatcher
//! - **TestClient** - in-process requests, resuming asynchronous handlers
//! - **RecordingInterceptor** / **CallLog** - hook call tracking
//! - **StubController** - canned views, bodies and failures
//! - **Assertions** - status, header, body and JSON checks
//!
//! ## Quick Start
//!
//! ```
//! use switchyard_testing::*;
//!
//! # tokio_test::block_on(async {
//! let log = CallLog::new();
//! let app = TestAppBuilder::new()
//!     .route(
//!         "/users/{id}",
//!         StubController::view("user", "users/show")
//!             .attribute("name", serde_json::json!("Ada"))
//!             .into_handler(),
//!     )
//!     .interceptor(RecordingInterceptor::new("audit", &log).into_arc())
//!     .build()
//!     .unwrap();
//!
//! let response = app.client().get("/users/1").await;
//! assert_status(&response, 200);
//! assert_json(&response, &serde_json::json!({"name": "Ada"}));
//! assert_eq!(log.calls(), vec!["audit.before", "audit.after", "audit.completion"]);
//! # });
//! ```
//!
//! ## Failures
//!
//! ```
//! use switchyard_core::Error;
//! use switchyard_testing::*;
//!
//! # tokio_test::block_on(async {
//! let app = TestAppBuilder::new()
//!     .route("/boom", StubController::failing("boom", || Error::Handler("x".into())).into_handler())
//!     .build()
//!     .unwrap();
//!
//! let response = app.client().get("/boom").await;
//! assert_error_kind(&response, "Handler");
//! # });
//! ```

mod assertions;
mod mock;
mod test_app;
mod test_client;

pub use assertions::{
    assert_body_contains, assert_error_kind, assert_header, assert_json, assert_status,
};
pub use mock::{CallLog, RecordingInterceptor, StubController};
pub use test_app::{TestApp, TestAppBuilder};
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
