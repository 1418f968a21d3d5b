// Switchyard - a front-controller request-dispatch engine
//
// One dispatcher receives every request, finds a handler through ordered
// route tables, runs its interceptor chain, invokes it through an adapter,
// and turns the result or error into a rendered view.

// Re-export core functionality
pub use switchyard_core::*;

// Handler and interceptor traits are async
pub use async_trait::async_trait;

// Re-export optional crates
#[cfg(feature = "config")]
pub use switchyard_config;

#[cfg(feature = "testing")]
pub use switchyard_testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use async_trait::async_trait;
    pub use switchyard_core::{
        Continuation, Controller, DispatchResult, Dispatched, Dispatcher, DispatcherBuilder,
        DispatcherConfig, Error, Flow, Handler, HandlerInterceptor, HandlerOutcome, HttpRequest,
        HttpResponse, Result, UrlHandlerMapping,
    };

    #[cfg(feature = "config")]
    pub use switchyard_config::{RouteManifest, SwitchyardConfig};

    #[cfg(feature = "testing")]
    pub use switchyard_testing::{TestAppBuilder, TestClient, TestResponse};
}
