// Test client driving a dispatcher in-process

use std::collections::BTreeMap;
use switchyard_core::{
    DispatchType, Dispatched, Dispatcher, Error, HttpRequest, HttpResponse,
};

/// Sends requests straight into a [`Dispatcher`].
///
/// Suspended dispatches are resumed before the response is returned, so a
/// test sees the final response of asynchronous handlers too.
#[derive(Clone)]
pub struct TestClient {
    dispatcher: Dispatcher,
}

impl TestClient {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    pub async fn options(&self, path: &str) -> TestResponse {
        self.request("OPTIONS", path, None).await
    }

    /// Make a request with custom method
    pub async fn request(&self, method: &str, path: &str, body: Option<Vec<u8>>) -> TestResponse {
        let mut builder = TestRequestBuilder::new(method, path);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.send(builder.build()).await
    }

    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        self.exchange(request).await.1
    }

    /// Dispatch `request` and hand it back with the response, so tests can
    /// inspect the attributes the dispatch left behind.
    pub async fn exchange(&self, mut request: HttpRequest) -> (HttpRequest, TestResponse) {
        let mut response = HttpResponse::ok();
        let outcome = match self.dispatcher.dispatch(&mut request, &mut response).await {
            Ok(Dispatched::Completed) => Ok(()),
            Ok(Dispatched::Suspended(pending)) => pending.resume(&mut request, &mut response).await,
            Err(error) => Err(error),
        };

        let result = match outcome {
            Ok(()) => TestResponse::Completed(response),
            Err(error) => TestResponse::Failed(error),
        };
        (request, result)
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: String,
    path: String,
    context_path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query_params: BTreeMap<String, String>,
    dispatch_type: DispatchType,
}

impl TestRequestBuilder {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            context_path: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
            query_params: BTreeMap::new(),
            dispatch_type: DispatchType::Request,
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set a JSON body and its content type
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn context_path(mut self, context_path: &str) -> Self {
        self.context_path = context_path.to_string();
        self
    }

    pub fn dispatch_type(mut self, dispatch_type: DispatchType) -> Self {
        self.dispatch_type = dispatch_type;
        self
    }

    pub fn build(self) -> HttpRequest {
        let query_string = if self.query_params.is_empty() {
            String::new()
        } else {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            format!("?{}", params.join("&"))
        };

        let mut request = HttpRequest::new(self.method, format!("{}{}", self.path, query_string))
            .with_body(self.body)
            .with_context_path(self.context_path)
            .with_dispatch_type(self.dispatch_type);
        for (key, value) in self.headers {
            request = request.with_header(key, value);
        }
        request
    }
}

/// Outcome of a test request
#[derive(Debug)]
pub enum TestResponse {
    /// The dispatcher answered, possibly with an error status.
    Completed(HttpResponse),
    /// The dispatcher raised an unresolved error.
    Failed(Error),
}

impl TestResponse {
    /// The response, panicking if dispatch failed
    pub fn assert_completed(&self) -> &HttpResponse {
        match self {
            TestResponse::Completed(response) => response,
            TestResponse::Failed(error) => {
                panic!("Expected a completed dispatch, got error: {:?}", error)
            }
        }
    }

    /// The error, panicking if dispatch completed
    pub fn assert_failed(&self) -> &Error {
        match self {
            TestResponse::Failed(error) => error,
            TestResponse::Completed(response) => {
                panic!("Expected a failed dispatch, got status {}", response.status)
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TestResponse::Completed(response) => Some(response.status),
            TestResponse::Failed(_) => None,
        }
    }

    pub fn body_string(&self) -> Option<String> {
        match self {
            TestResponse::Completed(response) => String::from_utf8(response.body.clone()).ok(),
            TestResponse::Failed(_) => None,
        }
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Completed(response) => serde_json::from_slice(&response.body)
                .map_err(|e| format!("Serialization error: {}", e)),
            TestResponse::Failed(error) => Err(format!("{:?}", error)),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        match self {
            TestResponse::Completed(response) => response.header(key),
            TestResponse::Failed(_) => None,
        }
    }
}
