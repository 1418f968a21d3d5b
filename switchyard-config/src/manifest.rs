//! Declarative route tables.
//!
//! A [`RouteManifest`] names handlers instead of holding them. It is turned
//! into a [`UrlHandlerMapping`] once the application's handler registry and
//! interceptors are known:
//!
//! ```toml
//! [routes]
//! order = 0
//! default_handler = "fallback"
//!
//! [routes.paths]
//! "/users/{id}" = "users"
//! "/admin/**" = "admin"
//!
//! [[routes.interceptors]]
//! name = "logging"
//! exclude = ["/admin/health"]
//! ```

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use switchyard_core::{
    AntPathMatcher, DispatcherConfig, HandlerInterceptor, HandlerRef, HandlerRegistry,
    LoggingInterceptor, MappedInterceptor, UrlHandlerMapping,
};
use tracing::debug;

/// Interceptor applied to a manifest's routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorDeclaration {
    /// Name in the [`InterceptorCatalog`].
    pub name: String,
    /// Paths the interceptor applies to; empty means all.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl InterceptorDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    fn is_global(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Patterns mapped to handler names, plus the interceptors they share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteManifest {
    pub order: Option<i32>,
    /// Handler for paths no pattern matches.
    pub default_handler: Option<String>,
    pub paths: BTreeMap<String, String>,
    pub interceptors: Vec<InterceptorDeclaration>,
}

impl RouteManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        self.paths.insert(pattern.into(), handler.into());
        self
    }

    pub fn interceptor(mut self, declaration: InterceptorDeclaration) -> Self {
        self.interceptors.push(declaration);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.default_handler.is_none()
    }

    /// Build the route table. Handler names resolve through `registry`,
    /// eagerly unless `config.lazy_init_handlers` is set.
    pub fn build_mapping(
        &self,
        registry: Arc<dyn HandlerRegistry>,
        catalog: &InterceptorCatalog,
        config: &DispatcherConfig,
    ) -> Result<UrlHandlerMapping> {
        self.validate()?;

        let mut mapping = match self.order {
            Some(order) => UrlHandlerMapping::new().with_order(order),
            None => UrlHandlerMapping::new(),
        };
        mapping.set_use_trailing_slash_match(config.use_trailing_slash_match);

        let support = mapping.support_mut();
        support.set_registry(registry);
        support.set_path_helper(config.path_helper());
        support.set_lazy_init(config.lazy_init_handlers);

        for declaration in &self.interceptors {
            let interceptor = catalog
                .get(&declaration.name)
                .ok_or_else(|| ConfigError::UnknownInterceptor(declaration.name.clone()))?;
            if declaration.is_global() {
                support.add_interceptor(interceptor);
                continue;
            }
            let mapped = declaration
                .include
                .iter()
                .fold(MappedInterceptor::new(interceptor), |m, p| m.include(p.as_str()));
            let mapped = declaration
                .exclude
                .iter()
                .fold(mapped, |m, p| m.exclude(p.as_str()));
            support.add_mapped_interceptor(mapped);
        }

        if let Some(name) = &self.default_handler {
            support.set_default_handler(HandlerRef::named(name.as_str()))?;
        }

        for (pattern, handler) in &self.paths {
            mapping.register_handler(pattern, HandlerRef::named(handler.as_str()))?;
        }

        debug!(
            routes = self.paths.len(),
            interceptors = self.interceptors.len(),
            "Built route table from manifest"
        );
        Ok(mapping)
    }
}

impl Validate for RouteManifest {
    fn validate(&self) -> Result<()> {
        let matcher = AntPathMatcher::new();
        for (pattern, handler) in &self.paths {
            ConfigValidator::is_path_pattern(pattern, &matcher, "routes.paths")?;
            ConfigValidator::not_empty(handler, &format!("handler for '{}'", pattern))?;
        }
        if let Some(name) = &self.default_handler {
            ConfigValidator::not_empty(name, "routes.default_handler")?;
        }
        for declaration in &self.interceptors {
            ConfigValidator::not_empty(&declaration.name, "routes.interceptors.name")?;
            for pattern in declaration.include.iter().chain(&declaration.exclude) {
                ConfigValidator::is_path_pattern(pattern, &matcher, "routes.interceptors")?;
            }
        }
        Ok(())
    }
}

/// Named interceptors a manifest can refer to.
///
/// `logging` is always available.
#[derive(Clone)]
pub struct InterceptorCatalog {
    entries: HashMap<String, Arc<dyn HandlerInterceptor>>,
}

impl InterceptorCatalog {
    pub fn new() -> Self {
        let mut entries: HashMap<String, Arc<dyn HandlerInterceptor>> = HashMap::new();
        entries.insert("logging".to_string(), Arc::new(LoggingInterceptor));
        Self { entries }
    }

    pub fn with(mut self, name: impl Into<String>, interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        self.register(name, interceptor);
        self
    }

    /// Register `interceptor`, replacing any previous one of that name.
    pub fn register(&mut self, name: impl Into<String>, interceptor: Arc<dyn HandlerInterceptor>) {
        self.entries.insert(name.into(), interceptor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HandlerInterceptor>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl Default for InterceptorCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterceptorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("InterceptorCatalog").field("names", &names).finish()
    }
}
