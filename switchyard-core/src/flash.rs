//! Flash attributes.
//!
//! A flash map carries attributes from one request to the next, typically
//! across a redirect. Before a request is handled the dispatcher asks the
//! [`FlashMapManager`] for a map targeted at it and publishes it as
//! [`InputFlashMap`]. It also publishes an empty [`OutputFlashMap`] that
//! handlers fill. A redirect view then saves that map for the redirect
//! target.

use crate::error::Result;
use crate::http::{HttpRequest, parse_query_string};
use crate::logging::{debug, trace};
use crate::result::Model;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default lifetime of a saved flash map.
pub const DEFAULT_FLASH_TIMEOUT: Duration = Duration::from_secs(180);

/// Attributes for a subsequent request, optionally aimed at a path and query.
#[derive(Debug, Clone, Default)]
pub struct FlashMap {
    attributes: Model,
    target_path: Option<String>,
    target_params: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl FlashMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.attributes.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Model {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn set_target_path(&mut self, path: impl Into<String>) {
        self.target_path = Some(path.into());
    }

    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    pub fn add_target_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.target_params.insert(name.into(), value.into());
    }

    pub fn target_params(&self) -> &HashMap<String, String> {
        &self.target_params
    }

    pub fn start_expiration(&mut self, timeout: Duration) {
        self.expires_at = Some(Instant::now() + timeout);
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Whether this map is aimed at `request`.
    fn matches(&self, request: &HttpRequest) -> bool {
        if let Some(target) = &self.target_path {
            let path = request.path.trim_end_matches('/');
            if target.trim_end_matches('/') != path {
                return false;
            }
        }
        self.target_params
            .iter()
            .all(|(name, value)| request.query(name) == Some(value))
    }

    /// More specific maps (more target params, then a target path) first.
    fn specificity(&self, other: &FlashMap) -> Ordering {
        other
            .target_params
            .len()
            .cmp(&self.target_params.len())
            .then_with(|| other.target_path.is_some().cmp(&self.target_path.is_some()))
    }
}

/// Flash map that arrived with the current request.
#[derive(Debug, Clone)]
pub struct InputFlashMap(pub Arc<FlashMap>);

/// Flash map being prepared for the next request.
#[derive(Debug, Clone)]
pub struct OutputFlashMap(pub Arc<Mutex<FlashMap>>);

impl OutputFlashMap {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(FlashMap::new())))
    }

    /// Add an attribute for the next request.
    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.0.lock().insert(key, value)
    }

    pub fn take(&self) -> FlashMap {
        std::mem::take(&mut *self.0.lock())
    }
}

impl Default for OutputFlashMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager of the current request, for views that save flash maps.
#[derive(Clone)]
pub struct FlashMapManagerHandle(pub Arc<dyn FlashMapManager>);

impl fmt::Debug for FlashMapManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlashMapManagerHandle(..)")
    }
}

/// Stores and retrieves flash maps.
pub trait FlashMapManager: Send + Sync {
    /// Remove and return the map aimed at `request`, dropping expired maps.
    fn retrieve_and_update(&self, request: &HttpRequest) -> Option<FlashMap>;

    /// Save `flash` for a later request. Empty maps are ignored.
    ///
    /// A relative target path is resolved against the request path and a
    /// query string in it becomes target params.
    fn save_output(&self, flash: FlashMap, request: &HttpRequest) -> Result<()>;
}

/// Process-local flash map storage.
pub struct InMemoryFlashMapManager {
    maps: Mutex<Vec<FlashMap>>,
    timeout: Duration,
}

impl InMemoryFlashMapManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FLASH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            maps: Mutex::new(Vec::new()),
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.maps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.lock().is_empty()
    }
}

impl Default for InMemoryFlashMapManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryFlashMapManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryFlashMapManager")
            .field("maps", &self.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FlashMapManager for InMemoryFlashMapManager {
    fn retrieve_and_update(&self, request: &HttpRequest) -> Option<FlashMap> {
        let mut maps = self.maps.lock();
        let before = maps.len();
        maps.retain(|m| !m.is_expired());
        if maps.len() != before {
            trace!(expired = before - maps.len(), "Dropped expired flash maps");
        }

        let best = maps
            .iter()
            .enumerate()
            .filter(|(_, m)| m.matches(request))
            .min_by(|(_, a), (_, b)| a.specificity(b))
            .map(|(idx, _)| idx)?;
        let found = maps.remove(best);
        debug!(path = %request.path, attributes = found.attributes.len(), "Retrieved flash map");
        Some(found)
    }

    fn save_output(&self, mut flash: FlashMap, request: &HttpRequest) -> Result<()> {
        if flash.is_empty() {
            return Ok(());
        }

        if let Some(target) = flash.target_path.take() {
            let (path, query) = match target.split_once('?') {
                Some((p, q)) => (p.to_string(), Some(q.to_string())),
                None => (target, None),
            };
            if let Some(query) = query {
                for (name, value) in parse_query_string(&query) {
                    flash.target_params.entry(name).or_insert(value);
                }
            }
            flash.target_path = Some(resolve_relative(&request.path, &path));
        }

        flash.start_expiration(self.timeout);
        debug!(target = ?flash.target_path, "Saving flash map");
        self.maps.lock().push(flash);
        Ok(())
    }
}

fn resolve_relative(current: &str, target: &str) -> String {
    if target.starts_with('/') || target.contains("://") {
        return target.to_string();
    }
    let base = match current.rfind('/') {
        Some(idx) => &current[..=idx],
        None => "/",
    };
    format!("{}{}", base, target)
}
