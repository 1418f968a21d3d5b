// Test application builder

use std::sync::Arc;
use switchyard_core::{
    Dispatcher, DispatcherBuilder, Handler, HandlerInterceptor, Result, UrlHandlerMapping,
};

/// A dispatcher assembled for a test
pub struct TestApp {
    pub dispatcher: Dispatcher,
}

impl TestApp {
    pub fn client(&self) -> crate::TestClient {
        crate::TestClient::new(self.dispatcher.clone())
    }
}

/// Collects routes and interceptors into a single route table, then lets
/// the test adjust the dispatcher before it is built.
pub struct TestAppBuilder {
    routes: Vec<(String, Handler)>,
    interceptors: Vec<Arc<dyn HandlerInterceptor>>,
    dispatcher: DispatcherBuilder,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            interceptors: Vec::new(),
            dispatcher: DispatcherBuilder::new(),
        }
    }

    pub fn route(mut self, pattern: &str, handler: Handler) -> Self {
        self.routes.push((pattern.to_string(), handler));
        self
    }

    /// Interceptor for every route, in registration order
    pub fn interceptor(mut self, interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Adjust the dispatcher builder, e.g. to add resolvers
    pub fn configure(mut self, f: impl FnOnce(DispatcherBuilder) -> DispatcherBuilder) -> Self {
        self.dispatcher = f(self.dispatcher);
        self
    }

    pub fn build(self) -> Result<TestApp> {
        let mut mapping = UrlHandlerMapping::new();
        for interceptor in self.interceptors {
            mapping.support_mut().add_interceptor(interceptor);
        }
        for (pattern, handler) in self.routes {
            mapping.register_handler(&pattern, handler)?;
        }

        let dispatcher = self.dispatcher.mapping(mapping).build()?;
        Ok(TestApp { dispatcher })
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StubController, assert_status};

    #[tokio::test]
    async fn test_built_app_answers() {
        let app = TestAppBuilder::new()
            .route("/hello", StubController::text("hello", "hi").into_handler())
            .build()
            .unwrap();

        let client = app.client();
        assert_status(&client.get("/hello").await, 200);
        assert_status(&client.get("/missing").await, 404);
    }

    #[test]
    fn test_conflicting_routes_fail_to_build() {
        let result = TestAppBuilder::new()
            .route("/a", StubController::text("one", "1").into_handler())
            .route("/a", StubController::text("two", "2").into_handler())
            .build();
        assert!(result.is_err());
    }
}
