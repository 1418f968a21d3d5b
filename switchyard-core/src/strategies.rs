//! Default dispatcher strategies.
//!
//! The strategy table is bundled as JSON and parsed once. For each strategy
//! kind it lists the built-in implementations a
//! [`DispatcherBuilder`](crate::DispatcherBuilder) installs when the
//! application supplies none of that kind.

use crate::adapter::{ControllerAdapter, FnHandlerAdapter, HandlerAdapter, RequestHandlerAdapter};
use crate::error::{Error, Result};
use crate::exception::{ExceptionResolver, StatusCodeResolver};
use crate::flash::{FlashMapManager, InMemoryFlashMapManager};
use crate::locale::{AcceptHeaderLocaleResolver, LocaleResolver};
use crate::view::{
    DefaultViewNameTranslator, JsonViewResolver, RedirectViewResolver, ViewNameTranslator,
    ViewResolver,
};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const BUNDLED: &str = include_str!("default_strategies.json");

static DEFAULTS: OnceLock<std::result::Result<DefaultStrategies, String>> = OnceLock::new();

/// Strategy kinds and their default implementation names, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultStrategies {
    table: BTreeMap<String, Vec<String>>,
}

impl DefaultStrategies {
    /// The bundled table.
    pub fn bundled() -> Result<&'static DefaultStrategies> {
        DEFAULTS
            .get_or_init(|| Self::parse(BUNDLED).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| Error::Configuration(format!("bundled default strategies: {}", e)))
    }

    pub fn parse(json: &str) -> Result<Self> {
        let table: BTreeMap<String, Vec<String>> = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid strategy table: {}", e)))?;
        Ok(Self { table })
    }

    /// Implementation names for `kind`; empty for unknown kinds.
    pub fn names(&self, kind: &str) -> &[String] {
        self.table.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn adapters(&self) -> Result<Vec<Arc<dyn HandlerAdapter>>> {
        self.build("HandlerAdapter", |name| {
            Some(match name {
                "RequestHandlerAdapter" => Arc::new(RequestHandlerAdapter) as Arc<dyn HandlerAdapter>,
                "ControllerAdapter" => Arc::new(ControllerAdapter),
                "FnHandlerAdapter" => Arc::new(FnHandlerAdapter),
                _ => return None,
            })
        })
    }

    pub fn exception_resolvers(&self) -> Result<Vec<Arc<dyn ExceptionResolver>>> {
        self.build("ExceptionResolver", |name| match name {
            "StatusCodeResolver" => Some(Arc::new(StatusCodeResolver::new()) as Arc<dyn ExceptionResolver>),
            _ => None,
        })
    }

    pub fn view_resolvers(&self) -> Result<Vec<Arc<dyn ViewResolver>>> {
        self.build("ViewResolver", |name| {
            Some(match name {
                "RedirectViewResolver" => Arc::new(RedirectViewResolver::new()) as Arc<dyn ViewResolver>,
                "JsonViewResolver" => Arc::new(JsonViewResolver::new()),
                _ => return None,
            })
        })
    }

    pub fn view_name_translator(&self) -> Result<Option<Arc<dyn ViewNameTranslator>>> {
        Ok(self
            .build("ViewNameTranslator", |name| match name {
                "DefaultViewNameTranslator" => {
                    Some(Arc::new(DefaultViewNameTranslator::new()) as Arc<dyn ViewNameTranslator>)
                }
                _ => None,
            })?
            .into_iter()
            .next())
    }

    pub fn locale_resolver(&self) -> Result<Option<Arc<dyn LocaleResolver>>> {
        Ok(self
            .build("LocaleResolver", |name| match name {
                "AcceptHeaderLocaleResolver" => {
                    Some(Arc::new(AcceptHeaderLocaleResolver::new()) as Arc<dyn LocaleResolver>)
                }
                _ => None,
            })?
            .into_iter()
            .next())
    }

    pub fn flash_map_manager(&self, timeout: Duration) -> Result<Option<Arc<dyn FlashMapManager>>> {
        Ok(self
            .build("FlashMapManager", |name| match name {
                "InMemoryFlashMapManager" => {
                    Some(Arc::new(InMemoryFlashMapManager::with_timeout(timeout)) as Arc<dyn FlashMapManager>)
                }
                _ => None,
            })?
            .into_iter()
            .next())
    }

    /// Whether the table asks for a name-based mapping when none is given.
    pub fn detects_named_handlers(&self) -> bool {
        self.names("HandlerMapping").iter().any(|n| n == "NameHandlerMapping")
    }

    fn build<T>(&self, kind: &str, make: impl Fn(&str) -> Option<T>) -> Result<Vec<T>> {
        self.names(kind)
            .iter()
            .map(|name| {
                make(name).ok_or_else(|| {
                    Error::Configuration(format!("unknown default {} strategy '{}'", kind, name))
                })
            })
            .collect()
    }
}
