// HTTP request and response types

use crate::attributes::Attributes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the container entered the dispatcher for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchType {
    /// A fresh client request.
    #[default]
    Request,
    /// A nested dispatch whose output is included in an outer response.
    Include,
    /// A server-side forward.
    Forward,
    /// A dispatch rendering an error page for a failed request.
    Error,
    /// A re-dispatch after asynchronous handling completed.
    Async,
}

/// HTTP request wrapper
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Full request path, without the query string.
    pub path: String,
    /// Prefix under which the dispatcher is mounted, e.g. `/app`.
    pub context_path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Decoded URI template variables of the best matching pattern.
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub dispatch_type: DispatchType,
    pub attributes: Attributes,
}

impl HttpRequest {
    /// Create a request. A query string in `path` is split off into
    /// `query_params`.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query_params) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_query_string(q)),
            None => (path, HashMap::new()),
        };
        Self {
            method: method.into().to_ascii_uppercase(),
            path,
            context_path: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params,
            dispatch_type: DispatchType::Request,
            attributes: Attributes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn with_dispatch_type(mut self, dispatch_type: DispatchType) -> Self {
        self.dispatch_type = dispatch_type;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::BadRequest(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Typed request attribute.
    pub fn attribute<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    committed: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set a header, replacing any existing header with the same name
    /// regardless of case.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.headers.insert(key, value.into());
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Write a JSON body and content type.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), crate::Error> {
        self.body = serde_json::to_vec(value)?;
        self.set_header("Content-Type", "application/json");
        Ok(())
    }

    /// Write a plain-text body and content type.
    pub fn write_text(&mut self, text: impl Into<String>) {
        self.body = text.into().into_bytes();
        self.set_header("Content-Type", "text/plain; charset=utf-8");
    }

    /// Send an error status with a short text body and commit the response.
    pub fn send_error(&mut self, status: u16, message: impl Into<String>) {
        self.status = status;
        self.write_text(message);
        self.committed = true;
    }

    /// Mark the response as written; later renders are skipped.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn header_lookup<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a query string into decoded key/value pairs.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|v| v.into_owned())
        .unwrap_or(value)
}
