//! Cross-origin request handling.
//!
//! Route tables consult CORS once a handler is found:
//!
//! - For a **preflight** (`OPTIONS` with `Origin` and
//!   `Access-Control-Request-Method`), the real handler is swapped for a
//!   [`PreflightHandler`] that evaluates the policy and writes the
//!   `Access-Control-*` headers.
//! - For an **actual** cross-origin request, a [`CorsInterceptor`] is placed
//!   first in the chain. It rejects disallowed requests with
//!   `403 Invalid CORS request` before any other interceptor or the handler
//!   runs.
//!
//! The policy applied is the global config for the lookup path (from a
//! [`CorsConfigSource`]) combined with the handler's own config.
//!
//! ```
//! use switchyard_core::CorsConfig;
//!
//! let cors = CorsConfig::new()
//!     .allow_origin("https://example.com")
//!     .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
//!     .allow_headers(vec!["Content-Type", "Authorization"])
//!     .allow_credentials(true)
//!     .max_age(3600);
//! assert!(cors.is_origin_allowed("https://example.com"));
//! ```

use crate::error::Result;
use crate::handler::{Handler, HttpRequestHandler};
use crate::http::{HttpRequest, HttpResponse};
use crate::interceptor::{Flow, HandlerInterceptor};
use crate::logging::debug;
use crate::path_matcher::AntPathMatcher;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const ORIGIN: &str = "Origin";
pub const ACCESS_CONTROL_REQUEST_METHOD: &str = "Access-Control-Request-Method";
pub const ACCESS_CONTROL_REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
pub const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ACCESS_CONTROL_ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ACCESS_CONTROL_ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const ACCESS_CONTROL_ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
pub const ACCESS_CONTROL_MAX_AGE: &str = "Access-Control-Max-Age";

/// Whether the request carries an `Origin` that differs from its own host.
pub fn is_cors_request(request: &HttpRequest) -> bool {
    let Some(origin) = request.header(ORIGIN) else {
        return false;
    };
    match request.header("Host") {
        Some(host) => origin_authority(origin) != host,
        None => true,
    }
}

/// `OPTIONS` with both `Origin` and `Access-Control-Request-Method`.
pub fn is_preflight_request(request: &HttpRequest) -> bool {
    request.is_method("OPTIONS")
        && request.has_header(ORIGIN)
        && request.has_header(ACCESS_CONTROL_REQUEST_METHOD)
}

fn origin_authority(origin: &str) -> &str {
    origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin)
        .trim_end_matches('/')
}

/// CORS policy
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allowed_origins: BTreeSet<String>,
    allow_any_origin: bool,
    origin_patterns: Vec<Regex>,
    allowed_methods: BTreeSet<String>,
    allowed_headers: BTreeSet<String>,
    allow_any_header: bool,
    exposed_headers: BTreeSet<String>,
    allow_credentials: bool,
    /// Preflight cache lifetime in seconds
    max_age: Option<u64>,
}

impl CorsConfig {
    /// Strict policy: no origins, `GET`/`HEAD`/`POST`, no extra headers.
    pub fn new() -> Self {
        Self {
            allowed_origins: BTreeSet::new(),
            allow_any_origin: false,
            origin_patterns: Vec::new(),
            allowed_methods: ["GET", "HEAD", "POST"].iter().map(|s| s.to_string()).collect(),
            allowed_headers: BTreeSet::new(),
            allow_any_header: false,
            exposed_headers: BTreeSet::new(),
            allow_credentials: false,
            max_age: Some(1800),
        }
    }

    /// Any origin, method and header. Development only.
    pub fn permissive() -> Self {
        Self::new()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"])
            .allow_any_header()
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        if origin == "*" {
            self.allow_any_origin = true;
        } else {
            self.allowed_origins.insert(origin.trim_end_matches('/').to_string());
        }
        self
    }

    /// Allow origins matching a regex, e.g. `https://.*\.example\.com`.
    pub fn allow_origin_regex(mut self, pattern: &str) -> std::result::Result<Self, regex::Error> {
        self.origin_patterns.push(Regex::new(&format!("^(?:{})$", pattern))?);
        Ok(self)
    }

    pub fn allow_any_origin(mut self) -> Self {
        self.allow_any_origin = true;
        self
    }

    pub fn allow_methods(mut self, methods: Vec<impl Into<String>>) -> Self {
        self.allowed_methods = methods.into_iter().map(|m| m.into().to_uppercase()).collect();
        self
    }

    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.insert(method.into().to_uppercase());
        self
    }

    pub fn allow_headers(mut self, headers: Vec<impl Into<String>>) -> Self {
        self.allowed_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self.allow_any_header = false;
        self
    }

    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.insert(header.into().to_lowercase());
        self
    }

    pub fn allow_any_header(mut self) -> Self {
        self.allow_any_header = true;
        self
    }

    pub fn expose_headers(mut self, headers: Vec<impl Into<String>>) -> Self {
        self.exposed_headers = headers.into_iter().map(|h| h.into()).collect();
        self
    }

    /// Cookies and authorization headers; `*` is then never echoed as origin.
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Merge `other` (usually handler-level) into this (usually global) policy.
    ///
    /// Origins, methods and headers are unioned; `other` wins for
    /// credentials and max age.
    pub fn combine(&self, other: &CorsConfig) -> CorsConfig {
        let mut merged = self.clone();
        merged.allow_any_origin |= other.allow_any_origin;
        merged.allowed_origins.extend(other.allowed_origins.iter().cloned());
        merged.origin_patterns.extend(other.origin_patterns.iter().cloned());
        merged.allowed_methods.extend(other.allowed_methods.iter().cloned());
        merged.allow_any_header |= other.allow_any_header;
        merged.allowed_headers.extend(other.allowed_headers.iter().cloned());
        merged.exposed_headers.extend(other.exposed_headers.iter().cloned());
        merged.allow_credentials = other.allow_credentials || self.allow_credentials;
        merged.max_age = other.max_age.or(self.max_age);
        merged
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.allow_any_origin {
            return true;
        }
        let origin = origin.trim_end_matches('/');
        self.allowed_origins.contains(origin) || self.origin_patterns.iter().any(|p| p.is_match(origin))
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods.contains(&method.to_uppercase())
    }

    pub fn is_header_allowed(&self, header: &str) -> bool {
        self.allow_any_header || self.allowed_headers.contains(&header.to_lowercase())
    }

    /// Value for `Access-Control-Allow-Origin`, or `None` if not allowed.
    fn allow_origin_value(&self, origin: &str) -> Option<String> {
        if !self.is_origin_allowed(origin) {
            return None;
        }
        if self.allow_any_origin && !self.allow_credentials {
            Some("*".to_string())
        } else {
            Some(origin.to_string())
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Global CORS policy lookup by request.
pub trait CorsConfigSource: Send + Sync {
    fn cors_config(&self, request: &HttpRequest, lookup_path: &str) -> Option<CorsConfig>;
}

/// Policies keyed by path pattern; the first registered match applies.
#[derive(Debug, Default)]
pub struct UrlCorsConfigSource {
    entries: Vec<(String, CorsConfig)>,
    matcher: Arc<AntPathMatcher>,
}

impl UrlCorsConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, pattern: impl Into<String>, config: CorsConfig) -> Self {
        self.entries.push((pattern.into(), config));
        self
    }
}

impl CorsConfigSource for UrlCorsConfigSource {
    fn cors_config(&self, _request: &HttpRequest, lookup_path: &str) -> Option<CorsConfig> {
        self.entries
            .iter()
            .find(|(pattern, _)| self.matcher.matches(pattern, lookup_path))
            .map(|(_, config)| config.clone())
    }
}

/// Applies a policy to a request, writing response headers.
pub trait CorsProcessor: Send + Sync {
    /// `false` means the request was rejected and the response was written.
    fn process(
        &self,
        config: Option<&CorsConfig>,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> bool;
}

/// Standard policy checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCorsProcessor;

impl DefaultCorsProcessor {
    fn reject(response: &mut HttpResponse) {
        response.send_error(403, "Invalid CORS request");
    }
}

impl CorsProcessor for DefaultCorsProcessor {
    fn process(
        &self,
        config: Option<&CorsConfig>,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> bool {
        if !is_cors_request(request) {
            return true;
        }
        if response.has_header(ACCESS_CONTROL_ALLOW_ORIGIN) {
            debug!("Skip: response already contains \"Access-Control-Allow-Origin\"");
            return true;
        }
        let Some(config) = config else {
            return true;
        };

        let preflight = is_preflight_request(request);
        response.set_header(
            "Vary",
            "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
        );

        let origin = request.header(ORIGIN).unwrap_or_default();
        let Some(allow_origin) = config.allow_origin_value(origin) else {
            debug!(origin, "Reject: origin is not allowed");
            Self::reject(response);
            return false;
        };

        let method = if preflight {
            request.header(ACCESS_CONTROL_REQUEST_METHOD).unwrap_or_default()
        } else {
            request.method.as_str()
        };
        if !config.is_method_allowed(method) {
            debug!(method, "Reject: HTTP method is not allowed");
            Self::reject(response);
            return false;
        }

        let requested_headers: Vec<&str> = if preflight {
            request
                .header(ACCESS_CONTROL_REQUEST_HEADERS)
                .map(|h| h.split(',').map(str::trim).filter(|h| !h.is_empty()).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        if requested_headers.iter().any(|h| !config.is_header_allowed(h)) {
            debug!(headers = ?requested_headers, "Reject: headers are not allowed");
            Self::reject(response);
            return false;
        }

        response.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if preflight {
            response.set_header(ACCESS_CONTROL_ALLOW_METHODS, method.to_uppercase());
            if !requested_headers.is_empty() {
                response.set_header(ACCESS_CONTROL_ALLOW_HEADERS, requested_headers.join(", "));
            }
            if let Some(max_age) = config.max_age {
                response.set_header(ACCESS_CONTROL_MAX_AGE, max_age.to_string());
            }
        } else if !config.exposed_headers.is_empty() {
            let exposed: Vec<&str> = config.exposed_headers.iter().map(String::as_str).collect();
            response.set_header(ACCESS_CONTROL_EXPOSE_HEADERS, exposed.join(", "));
        }
        if config.allow_credentials {
            response.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        }
        true
    }
}

/// Terminal handler answering a preflight request.
pub struct PreflightHandler {
    config: Option<CorsConfig>,
    processor: Arc<dyn CorsProcessor>,
}

impl PreflightHandler {
    pub fn new(config: Option<CorsConfig>, processor: Arc<dyn CorsProcessor>) -> Self {
        Self { config, processor }
    }

    /// Wrap as a handler named after the one it stands in for.
    pub fn into_handler(self, replaces: &Handler) -> Handler {
        Handler::request_handler(format!("preflight[{}]", replaces.name()), self)
    }
}

#[async_trait]
impl HttpRequestHandler for PreflightHandler {
    async fn handle_request(&self, request: &HttpRequest, response: &mut HttpResponse) -> Result<()> {
        if self.processor.process(self.config.as_ref(), request, response) {
            response.status = 204;
        }
        response.commit();
        Ok(())
    }
}

/// First interceptor of an actual cross-origin request's chain.
pub struct CorsInterceptor {
    config: Option<CorsConfig>,
    processor: Arc<dyn CorsProcessor>,
}

impl CorsInterceptor {
    pub fn new(config: Option<CorsConfig>, processor: Arc<dyn CorsProcessor>) -> Self {
        Self { config, processor }
    }
}

#[async_trait]
impl HandlerInterceptor for CorsInterceptor {
    async fn before(
        &self,
        request: &mut HttpRequest,
        response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<Flow> {
        Ok(if self.processor.process(self.config.as_ref(), request, response) {
            Flow::Continue
        } else {
            Flow::Halt
        })
    }

    fn name(&self) -> &str {
        "CorsInterceptor"
    }
}
