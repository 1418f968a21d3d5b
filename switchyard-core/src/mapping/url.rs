// URL pattern route table

use super::{ExposedMatch, HandlerMapping, MappingSupport};
use crate::error::{Error, Result};
use crate::handler::HandlerRef;
use crate::http::HttpRequest;
use crate::interceptor::ExecutionChain;
use crate::logging::{debug, trace};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Result of a route table lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub handler: HandlerRef,
    /// Pattern that won, or the lookup path itself for direct and fallback hits.
    pub pattern: String,
    pub path_within_mapping: String,
    /// Present for pattern matches only.
    pub uri_variables: Option<HashMap<String, String>>,
}

impl RouteMatch {
    fn direct(handler: HandlerRef, path: &str, path_within: &str) -> Self {
        Self {
            handler,
            pattern: path.to_string(),
            path_within_mapping: path_within.to_string(),
            uri_variables: None,
        }
    }

    fn into_parts(self) -> (HandlerRef, ExposedMatch) {
        (
            self.handler,
            ExposedMatch {
                pattern: self.pattern,
                path_within_mapping: self.path_within_mapping,
                uri_variables: self.uri_variables,
            },
        )
    }
}

/// Route table keyed by Ant-style path patterns.
///
/// Exact paths are looked up directly. Otherwise every pattern is tested and
/// the most specific match wins. `/` registers the root handler and `/*` the
/// default handler.
///
/// ```rust
/// use switchyard_core::{Handler, HttpResponse, UrlHandlerMapping};
///
/// let users = Handler::from_fn("users", |_req| async { Ok(HttpResponse::ok()) });
/// let user = Handler::from_fn("user", |_req| async { Ok(HttpResponse::ok()) });
///
/// let mut mapping = UrlHandlerMapping::new();
/// mapping.register_handler("/users", users).unwrap();
/// mapping.register_handler("/users/{id}", user).unwrap();
///
/// let found = mapping.lookup("/users/42").unwrap().unwrap();
/// assert_eq!(found.pattern, "/users/{id}");
/// assert_eq!(found.uri_variables.unwrap()["id"], "42");
/// ```
#[derive(Default)]
pub struct UrlHandlerMapping {
    support: MappingSupport,
    handlers: HashMap<String, HandlerRef>,
    /// Registration order, for deterministic tie-breaking.
    patterns: Vec<String>,
    root_handler: Option<HandlerRef>,
    use_trailing_slash_match: bool,
}

impl UrlHandlerMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn support(&self) -> &MappingSupport {
        &self.support
    }

    /// Shared settings: interceptors, CORS, registry, default handler.
    pub fn support_mut(&mut self) -> &mut MappingSupport {
        &mut self.support
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.support.set_order(order);
        self
    }

    /// Also match `pattern + "/"`, so `/users` serves `/users/`.
    pub fn set_use_trailing_slash_match(&mut self, enabled: bool) {
        self.use_trailing_slash_match = enabled;
    }

    pub fn root_handler(&self) -> Option<&HandlerRef> {
        self.root_handler.as_ref()
    }

    /// Registered patterns in registration order (root and default excluded).
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn handler_for_pattern(&self, pattern: &str) -> Option<&HandlerRef> {
        self.handlers.get(pattern)
    }

    /// Map `pattern` to `handler`.
    ///
    /// Registering the same handler again is a no-op; a different handler
    /// for an existing pattern is [`Error::Configuration`].
    pub fn register_handler(&mut self, pattern: &str, handler: impl Into<HandlerRef>) -> Result<()> {
        let pattern = if pattern.starts_with('/') {
            pattern.to_string()
        } else {
            format!("/{}", pattern)
        };
        self.support.matcher().validate(&pattern)?;
        let handler = self.support.prepare(handler.into())?;

        if let Some(existing) = self.handlers.get(&pattern) {
            if existing.same_as(&handler) {
                trace!(pattern = %pattern, "Handler already mapped");
                return Ok(());
            }
            return Err(Error::Configuration(format!(
                "Cannot map {} to URL path [{}]: there is already {} mapped",
                handler.describe(),
                pattern,
                existing.describe()
            )));
        }

        match pattern.as_str() {
            "/" => self.set_root_handler(handler),
            "/*" => self.support.set_default_handler(handler),
            _ => {
                debug!(pattern = %pattern, handler = %handler.describe(), "Mapped URL path");
                self.patterns.push(pattern.clone());
                self.handlers.insert(pattern, handler);
                Ok(())
            }
        }
    }

    /// Register several patterns for the same handler.
    pub fn register_handlers<'a>(
        &mut self,
        patterns: impl IntoIterator<Item = &'a str>,
        handler: impl Into<HandlerRef>,
    ) -> Result<()> {
        let handler = handler.into();
        for pattern in patterns {
            self.register_handler(pattern, handler.clone())?;
        }
        Ok(())
    }

    fn set_root_handler(&mut self, handler: HandlerRef) -> Result<()> {
        match &self.root_handler {
            Some(existing) if existing.same_as(&handler) => Ok(()),
            Some(existing) => Err(Error::Configuration(format!(
                "Cannot map {} as root handler: there is already {} mapped",
                handler.describe(),
                existing.describe()
            ))),
            None => {
                debug!(handler = %handler.describe(), "Root mapping");
                self.root_handler = Some(handler);
                Ok(())
            }
        }
    }

    /// Find the handler for a lookup path, falling back on the root handler
    /// for `/` and on the default handler otherwise.
    pub fn lookup(&self, lookup_path: &str) -> Result<Option<RouteMatch>> {
        if let Some(found) = self.lookup_handler(lookup_path)? {
            return Ok(Some(found));
        }

        let fallback = if lookup_path == "/" {
            self.root_handler.as_ref()
        } else {
            None
        }
        .or(self.support.default_handler());

        Ok(fallback.map(|handler| RouteMatch::direct(handler.clone(), lookup_path, lookup_path)))
    }

    fn lookup_handler(&self, path: &str) -> Result<Option<RouteMatch>> {
        if let Some(handler) = self.handlers.get(path) {
            trace!(path, "Direct match");
            return Ok(Some(RouteMatch::direct(handler.clone(), path, path)));
        }

        let matcher = self.support.matcher();
        let mut matching: Vec<String> = Vec::new();
        for pattern in &self.patterns {
            if matcher.matches(pattern, path) {
                matching.push(pattern.clone());
            } else if self.use_trailing_slash_match && !pattern.ends_with('/') {
                let slashed = format!("{}/", pattern);
                if matcher.matches(&slashed, path) {
                    matching.push(slashed);
                }
            }
        }
        if matching.is_empty() {
            return Ok(None);
        }

        let comparator = matcher.pattern_comparator(path);
        matching.sort_by(|a, b| comparator.compare(a, b));
        let best = &matching[0];
        if matching.len() > 1 {
            trace!(path, candidates = ?matching, "Matching patterns");
        }

        let handler = self
            .handlers
            .get(best)
            .or_else(|| best.strip_suffix('/').and_then(|p| self.handlers.get(p)))
            .ok_or_else(|| {
                Error::Internal(format!("Could not find handler for best pattern match [{}]", best))
            })?;

        let path_within = matcher.extract_path_within_pattern(best, path);

        // Patterns that tie with the best one contribute their variables too.
        let mut vars = HashMap::new();
        for pattern in matching.iter().filter(|p| comparator.compare(best, p) == Ordering::Equal) {
            vars.extend(matcher.extract_uri_template_variables(pattern, path)?);
        }
        let vars = self.support.path_helper().decode_path_variables(vars);
        trace!(path, pattern = %best, vars = ?vars, "Pattern match");

        Ok(Some(RouteMatch {
            handler: handler.clone(),
            pattern: best.clone(),
            path_within_mapping: path_within,
            uri_variables: Some(vars),
        }))
    }
}

impl HandlerMapping for UrlHandlerMapping {
    fn handler(&self, request: &HttpRequest) -> Result<Option<ExecutionChain>> {
        let lookup_path = self.support.lookup_path(request);
        let Some(found) = self.lookup(&lookup_path)? else {
            trace!(path = %lookup_path, "No handler mapped");
            return Ok(None);
        };
        let (handler, exposed) = found.into_parts();
        self.support
            .complete(request, &lookup_path, &handler, exposed)
            .map(Some)
    }

    fn order(&self) -> i32 {
        self.support.order()
    }

    fn name(&self) -> &str {
        "UrlHandlerMapping"
    }
}

impl fmt::Debug for UrlHandlerMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlHandlerMapping")
            .field("patterns", &self.patterns)
            .field("root", &self.root_handler.as_ref().map(|h| h.describe()))
            .field("trailing_slash", &self.use_trailing_slash_match)
            .field("support", &self.support)
            .finish()
    }
}
