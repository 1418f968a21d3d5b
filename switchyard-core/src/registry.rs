// Named handler registry

use crate::cache::LookupCache;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::logging::{debug, trace};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Result<Handler> + Send + Sync>;

/// Source of handlers referenced by name from route tables.
pub trait HandlerRegistry: Send + Sync {
    /// Look up a handler by name or alias. `Ok(None)` means unknown.
    fn resolve(&self, name: &str) -> Result<Option<Handler>>;

    /// Every registered name, in sorted order.
    fn names(&self) -> Vec<String>;

    /// Aliases pointing at `name`.
    fn aliases(&self, name: &str) -> Vec<String>;
}

/// In-memory registry of handler instances and lazily built handlers.
///
/// Factory-built handlers are created on first resolution and memoized, so
/// every later lookup returns the same instance.
///
/// ```rust
/// use switchyard_core::{Handler, HandlerRegistry, HttpResponse, StaticHandlerRegistry};
///
/// let registry = StaticHandlerRegistry::new();
/// registry.register(Handler::from_fn("/health", |_req| async { Ok(HttpResponse::ok()) }));
/// registry.alias("/health", "/status");
///
/// let handler = registry.resolve("/status").unwrap().unwrap();
/// assert_eq!(handler.name(), "/health");
/// ```
#[derive(Default)]
pub struct StaticHandlerRegistry {
    handlers: RwLock<BTreeMap<String, Handler>>,
    factories: RwLock<BTreeMap<String, Factory>>,
    aliases: RwLock<HashMap<String, String>>,
    built: LookupCache<String, Handler>,
}

impl StaticHandlerRegistry {
    pub fn new() -> Self {
        debug!("Creating handler registry");
        Self::default()
    }

    /// Register a handler under its own name, replacing any previous one.
    pub fn register(&self, handler: Handler) {
        let name = handler.name().to_string();
        trace!(handler = %name, "Registering handler");
        self.handlers.write().insert(name.clone(), handler);
        self.built.remove(&name);
        debug!(handler = %name, "Handler registered");
    }

    /// Register a handler under an explicit name.
    pub fn register_as(&self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        self.handlers.write().insert(name.clone(), handler);
        self.built.remove(&name);
        debug!(handler = %name, "Handler registered");
    }

    /// Register a handler built on first use.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Handler> + Send + Sync + 'static,
    {
        let name = name.into();
        self.factories.write().insert(name.clone(), Arc::new(factory));
        debug!(handler = %name, "Handler factory registered");
    }

    /// Make `alias` resolve to `name`.
    pub fn alias(&self, name: impl Into<String>, alias: impl Into<String>) {
        let (name, alias) = (name.into(), alias.into());
        trace!(handler = %name, alias = %alias, "Registering alias");
        self.aliases.write().insert(alias, name);
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = self.canonical(name);
        self.handlers.read().contains_key(&name) || self.factories.read().contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty() && self.factories.read().is_empty()
    }

    fn canonical(&self, name: &str) -> String {
        self.aliases
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

impl HandlerRegistry for StaticHandlerRegistry {
    fn resolve(&self, name: &str) -> Result<Option<Handler>> {
        let name = self.canonical(name);
        if let Some(handler) = self.handlers.read().get(&name) {
            return Ok(Some(handler.clone()));
        }
        if let Some(handler) = self.built.get(&name) {
            return Ok(Some(handler));
        }

        let factory = self.factories.read().get(&name).cloned();
        let Some(factory) = factory else {
            trace!(handler = %name, "Handler not found in registry");
            return Ok(None);
        };

        debug!(handler = %name, "Creating handler from factory");
        let handler = factory().map_err(|e| {
            Error::Configuration(format!("failed to create handler '{}': {}", name, e))
        })?;
        self.built.insert(name, handler.clone());
        Ok(Some(handler))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        for name in self.factories.read().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .aliases
            .read()
            .iter()
            .filter(|(_, target)| target.as_str() == name)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }
}

impl fmt::Debug for StaticHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticHandlerRegistry")
            .field("names", &self.names())
            .field("aliases", &self.aliases.read().len())
            .finish()
    }
}
